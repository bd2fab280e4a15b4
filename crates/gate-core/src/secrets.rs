use std::path::Path;

/// Look up a secret by name.
///
/// Mounted secret files win: `<dir>/<name>`, trimmed. Otherwise the
/// environment variable named after the secret, upper-cased with `-` turned
/// into `_` (`mistral-api-key` → `MISTRAL_API_KEY`). Empty values count as
/// absent.
pub fn read_secret(dir: &Path, name: &str) -> Option<String> {
    let from_file = std::fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if from_file.is_some() {
        return from_file;
    }
    std::env::var(env_name(name))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn env_name(secret: &str) -> String {
    secret.to_uppercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_is_read_and_trimmed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bridge-key"), "s3cret\n").unwrap();
        assert_eq!(read_secret(dir.path(), "bridge-key").as_deref(), Some("s3cret"));
    }

    #[test]
    fn env_fallback_uses_upper_snake_name() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("ACTIONGATE_TEST_SECRET_ONE", "from-env");
        assert_eq!(
            read_secret(dir.path(), "actiongate-test-secret-one").as_deref(),
            Some("from-env")
        );
        std::env::remove_var("ACTIONGATE_TEST_SECRET_ONE");
    }

    #[test]
    fn empty_file_falls_through_to_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("actiongate-test-empty"), "  \n").unwrap();
        assert_eq!(read_secret(dir.path(), "actiongate-test-empty"), None);
    }

    #[test]
    fn env_name_conversion() {
        assert_eq!(env_name("mistral-api-key"), "MISTRAL_API_KEY");
        assert_eq!(env_name("MISTRAL_API_KEY"), "MISTRAL_API_KEY");
    }
}
