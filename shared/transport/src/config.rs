/// Reads credentials from the environment on every call rather than caching them at startup, so
/// a rotated secret applies on the very next request -- no restart needed.
pub fn basic_auth_credentials() -> Option<(String, String)> {
    let username = std::env::var("LOOP_USERNAME")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()?;
    let password = std::env::var("LOOP_PASSWORD")
        .or_else(|_| std::env::var("PASSWORD"))
        .ok()?;
    Some((username, password))
}

pub fn host() -> Option<String> {
    std::env::var("LOOP_HOST").or_else(|_| std::env::var("HOST")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn prefers_prefixed_variable() {
        // SAFETY: serialized via `serial_test` so no other test races these env mutations.
        unsafe {
            std::env::set_var("LOOP_USERNAME", "prefixed");
            std::env::set_var("USERNAME", "fallback");
        }
        assert_eq!(
            basic_auth_credentials().unwrap().0,
            "prefixed".to_string()
        );
        unsafe {
            std::env::remove_var("LOOP_USERNAME");
            std::env::remove_var("USERNAME");
        }
    }
}
