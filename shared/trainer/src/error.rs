/// The two ways a state handler can end besides plain success. `perform_state` treats them very
/// differently: a `Failed` is recorded under the handler's error-map key and rolled back to the
/// previous state for a retry on the next tick; a `Cancelled` is never swallowed and propagates
/// all the way out of `run_training_loop`.
#[derive(Debug)]
pub enum HandlerError {
    Failed(String),
    Cancelled,
}

impl HandlerError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        HandlerError::Failed(err.to_string())
    }
}

impl From<learning_loop_data::DataExchangeError> for HandlerError {
    fn from(err: learning_loop_data::DataExchangeError) -> Self {
        HandlerError::failed(err)
    }
}

impl From<learning_loop_persistence::PersistenceError> for HandlerError {
    fn from(err: learning_loop_persistence::PersistenceError) -> Self {
        HandlerError::failed(err)
    }
}

impl From<learning_loop_transport::TransportError> for HandlerError {
    fn from(err: learning_loop_transport::TransportError) -> Self {
        HandlerError::failed(err)
    }
}

impl From<learning_loop_executor::ExecutorError> for HandlerError {
    fn from(err: learning_loop_executor::ExecutorError) -> Self {
        HandlerError::failed(err)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::failed(err)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Failed(format!("{err:#}"))
    }
}
