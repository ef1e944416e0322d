pub mod mock_loop;
pub mod test_utils;

pub use mock_loop::{MockLoop, MockReply};
