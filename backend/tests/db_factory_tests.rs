//! Tests for db::factory and db::repo_config - repository creation and configuration.

mod support;

use std::io::Write;
use std::str::FromStr;

use pgpress::db::factory::{RepositoryFactory, RepositoryType};
use pgpress::db::repo_config::{AccountingSettings, RepositoryConfig, DISCONTINUITY_POLICY_ENV};
use pgpress::db::{CycleRepository, RepositoryError};
use pgpress::models::DiscontinuityPolicy;

#[test]
fn test_repository_type_from_str() {
    assert_eq!(RepositoryType::from_str("postgres").unwrap(), RepositoryType::Postgres);
    assert_eq!(RepositoryType::from_str("PG").unwrap(), RepositoryType::Postgres);
    assert_eq!(RepositoryType::from_str("local").unwrap(), RepositoryType::Local);
    assert_eq!(RepositoryType::from_str("memory").unwrap(), RepositoryType::Local);

    let result = RepositoryType::from_str("sqlite");
    assert!(result.unwrap_err().contains("Unknown repository type"));
}

#[test]
fn test_repository_type_from_env_default() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", None),
            ("PG_DATABASE_URL", None),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[test]
fn test_repository_type_from_env_with_database_url() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", None),
            ("DATABASE_URL", Some("postgres://localhost/pgpress")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Postgres);
        },
    );
}

#[test]
fn test_repository_type_from_env_explicit_wins() {
    support::with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("local")),
            ("DATABASE_URL", Some("postgres://localhost/pgpress")),
        ],
        || {
            assert_eq!(RepositoryType::from_env(), RepositoryType::Local);
        },
    );
}

#[tokio::test]
async fn test_create_local_via_factory() {
    let repo = RepositoryFactory::create(RepositoryType::Local, None)
        .await
        .unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[cfg(not(feature = "postgres-repo"))]
#[tokio::test]
async fn test_create_postgres_without_feature_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("feature not enabled"));
}

#[cfg(feature = "postgres-repo")]
#[tokio::test]
async fn test_create_postgres_without_config_fails() {
    let err = RepositoryFactory::create(RepositoryType::Postgres, None)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("requires PostgresConfig"));
}

#[tokio::test]
async fn test_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[repository]
type = "local"

[accounting]
discontinuity_policy = "raw"
"#
    )
    .unwrap();

    let config = RepositoryConfig::from_file(file.path()).unwrap();
    assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
    assert_eq!(config.accounting.discontinuity_policy, DiscontinuityPolicy::Raw);

    let repo = RepositoryFactory::from_config_file(file.path()).await.unwrap();
    assert!(repo.health_check().await.unwrap());
}

#[test]
fn test_missing_config_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RepositoryConfig::from_file(dir.path().join("repository.toml")).unwrap_err();
    assert!(matches!(err, RepositoryError::ConfigurationError { .. }));
}

#[test]
fn test_invalid_repository_type_in_config() {
    let config = RepositoryConfig::from_toml_str(
        r#"
[repository]
type = "mongo"
"#,
    )
    .unwrap();
    assert!(config.repository_type().is_err());
}

#[test]
fn test_accounting_settings_from_env() {
    support::with_scoped_env(&[(DISCONTINUITY_POLICY_ENV, Some("raw"))], || {
        let settings = AccountingSettings::from_env().unwrap();
        assert_eq!(settings.discontinuity_policy, DiscontinuityPolicy::Raw);
    });

    support::with_scoped_env(&[(DISCONTINUITY_POLICY_ENV, None)], || {
        let settings = AccountingSettings::from_env().unwrap();
        assert_eq!(settings.discontinuity_policy, DiscontinuityPolicy::CounterReset);
    });

    support::with_scoped_env(&[(DISCONTINUITY_POLICY_ENV, Some("clamp"))], || {
        let err = AccountingSettings::from_env().unwrap_err();
        assert!(matches!(err, RepositoryError::ConfigurationError { .. }));
    });
}
