#[cfg(test)]
mod tests {
    use rustf_session::config::{AppConfig, SessionStorageConfig};
    use rustf_session::session::DEFAULT_NAME;
    use rustf_session::{SameSite, SessionOptions, SessionStoreFactory, Store};
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(
            &path,
            r#"
environment = "development"

[session]
cookie_name = "dev_session"
namespace = "DEV:SESSION"
idle_timeout = 3600
absolute_timeout = 0
same_site = "Strict"
max_concurrent_sessions = 3

[session.storage]
type = "memory"
purge_interval = 0
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();

        assert_eq!(config.session.cookie_name, "dev_session");
        assert_eq!(config.session.namespace, "DEV:SESSION");
        assert_eq!(config.session.max_concurrent_sessions, 3);
        assert!(matches!(
            config.session.storage,
            SessionStorageConfig::Memory { purge_interval: 0 }
        ));

        let options = SessionOptions::from(&config.session);
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(options.absolute_timeout, None);
        assert_eq!(options.same_site, SameSite::Strict);
    }

    #[test]
    fn test_invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[session\nnamespace = ").unwrap();
        assert!(AppConfig::from_file(&path).is_err());

        let path = dir.path().join("empty_namespace.toml");
        fs::write(&path, "[session]\nnamespace = \"\"\n").unwrap();
        assert!(AppConfig::from_file(&path).is_err());

        assert!(AppConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[tokio::test]
    async fn test_store_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(
            &path,
            r#"
[session]
namespace = "FILE:SESSION"
idle_timeout = 120
command_timeout_ms = 1000
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        let (store, purge_task) = SessionStoreFactory::create_store(&config.session)
            .await
            .unwrap();

        let mut session = store.new_session(DEFAULT_NAME).await.unwrap();
        session.set("k", "v").unwrap();
        session.save().await.unwrap();

        assert!(store
            .session_key(DEFAULT_NAME, session.id())
            .starts_with("FILE:SESSION:SESSION:"));
        let reloaded = store.get(session.id(), DEFAULT_NAME).await.unwrap();
        assert_eq!(reloaded.options().idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(reloaded.get_as::<String>("k"), Some("v".to_string()));

        if let Some(handle) = purge_task {
            handle.abort();
        }
    }
}
