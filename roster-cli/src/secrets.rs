//! Credential loading
//!
//! Both credentials live in small JSON documents. A reference names where the
//! document lives: `arn:…` for AWS Secrets Manager, `file:<path>` for a local
//! file, `env:<VAR>` for an environment variable.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Keys accepted for the BambooHR API key, in lookup order
pub const BAMBOO_KEY_ALIASES: &[&str] = &["bamboohr_api_key", "api_key", "token"];
/// Keys accepted for the Moodle web-service token, in lookup order
pub const MOODLE_TOKEN_ALIASES: &[&str] = &["moodle_token", "token", "api_token"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    SecretsManager(String),
    File(PathBuf),
    Env(String),
}

impl SecretRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            bail!("Secret reference is not configured");
        }

        if reference.starts_with("arn:") {
            Ok(Self::SecretsManager(reference.to_string()))
        } else if let Some(path) = reference.strip_prefix("file:") {
            Ok(Self::File(PathBuf::from(path)))
        } else if let Some(var) = reference.strip_prefix("env:") {
            Ok(Self::Env(var.to_string()))
        } else {
            bail!("Unsupported secret reference {reference:?}, expected arn:, file: or env:")
        }
    }

    pub fn is_secrets_manager(&self) -> bool {
        matches!(self, Self::SecretsManager(_))
    }
}

/// Fetches secret documents, creating the Secrets Manager client only when
/// some reference needs it.
pub struct SecretLoader {
    client: Option<aws_sdk_secretsmanager::Client>,
}

impl SecretLoader {
    pub async fn for_refs(refs: &[&SecretRef], sdk_config: Option<&aws_config::SdkConfig>) -> Self {
        let client = if refs.iter().any(|r| r.is_secrets_manager()) {
            let client = match sdk_config {
                Some(sdk_config) => aws_sdk_secretsmanager::Client::new(sdk_config),
                None => aws_sdk_secretsmanager::Client::new(&aws_config::from_env().load().await),
            };
            Some(client)
        } else {
            None
        };
        Self { client }
    }

    pub async fn fetch(&self, reference: &SecretRef) -> Result<String> {
        match reference {
            SecretRef::SecretsManager(arn) => {
                let client = self
                    .client
                    .as_ref()
                    .context("Secrets Manager client was not initialized")?;
                let output = client
                    .get_secret_value()
                    .secret_id(arn)
                    .send()
                    .await
                    .with_context(|| format!("Failed to get secret {arn}"))?;

                let blob = if let Some(text) = output.secret_string() {
                    text.to_string()
                } else if let Some(binary) = output.secret_binary() {
                    String::from_utf8_lossy(binary.as_ref()).into_owned()
                } else {
                    String::new()
                };
                info!(secret = %arn, "Secret loaded from AWS Secrets Manager");
                Ok(blob)
            }
            SecretRef::File(path) => {
                let blob = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read secret file {}", path.display()))?;
                debug!(path = %path.display(), "Secret loaded from file");
                Ok(blob)
            }
            SecretRef::Env(var) => {
                let blob = std::env::var(var)
                    .with_context(|| format!("Secret variable {var} is not set"))?;
                debug!(variable = %var, "Secret loaded from environment");
                Ok(blob)
            }
        }
    }

    /// Fetch the document at `reference` and pull the credential out of it.
    pub async fn credential(&self, reference: &SecretRef, aliases: &[&str]) -> Result<String> {
        let blob = self.fetch(reference).await?;
        match credential_from_blob(&blob, aliases) {
            Some(value) => Ok(value),
            None => bail!(
                "Secret {} has none of the keys {}",
                describe(reference),
                aliases.join(", ")
            ),
        }
    }
}

/// First non-empty string among `aliases` in a JSON object document.
/// Anything that is not a JSON object holds no credentials.
pub fn credential_from_blob(blob: &str, aliases: &[&str]) -> Option<String> {
    let document: serde_json::Value = serde_json::from_str(blob).ok()?;
    let object = document.as_object()?;
    aliases.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn describe(reference: &SecretRef) -> String {
    match reference {
        SecretRef::SecretsManager(arn) => arn.clone(),
        SecretRef::File(path) => format!("file:{}", path.display()),
        SecretRef::Env(var) => format!("env:{var}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("arn:aws:secretsmanager:eu-west-1:123:secret:bamboo", SecretRef::SecretsManager("arn:aws:secretsmanager:eu-west-1:123:secret:bamboo".into()) ; "arn")]
    #[test_case("file:/run/secrets/moodle.json", SecretRef::File("/run/secrets/moodle.json".into()) ; "file")]
    #[test_case("env:MOODLE_SECRET", SecretRef::Env("MOODLE_SECRET".into()) ; "env")]
    fn test_parse_reference(input: &str, expected: SecretRef) {
        assert_eq!(SecretRef::parse(input).unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("bamboo-secret" ; "bare name")]
    fn test_parse_rejects(input: &str) {
        assert!(SecretRef::parse(input).is_err());
    }

    #[test_case(r#"{"bamboohr_api_key":"k1","api_key":"k2"}"#, Some("k1") ; "primary key wins")]
    #[test_case(r#"{"api_key":"k2","token":"k3"}"#, Some("k2") ; "first alias")]
    #[test_case(r#"{"bamboohr_api_key":"","token":"k3"}"#, Some("k3") ; "empty value skipped")]
    #[test_case(r#"{"token":42}"#, None ; "non string value")]
    #[test_case("not json", None ; "invalid json")]
    #[test_case(r#"["token"]"#, None ; "not an object")]
    fn test_bamboo_aliases(blob: &str, expected: Option<&str>) {
        assert_eq!(
            credential_from_blob(blob, BAMBOO_KEY_ALIASES).as_deref(),
            expected
        );
    }

    #[test]
    fn test_moodle_aliases() {
        let blob = r#"{"api_token":"t3","token":"t2"}"#;
        assert_eq!(
            credential_from_blob(blob, MOODLE_TOKEN_ALIASES).as_deref(),
            Some("t2")
        );
    }

    #[tokio::test]
    async fn test_file_credential() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("moodle.json");
        std::fs::write(&path, r#"{"moodle_token":"abc123"}"#).unwrap();
        let reference = SecretRef::File(path);

        let loader = SecretLoader::for_refs(&[&reference], None).await;
        let token = loader
            .credential(&reference, MOODLE_TOKEN_ALIASES)
            .await
            .unwrap();

        assert_eq!(token, "abc123");
    }

    #[tokio::test]
    async fn test_missing_credential_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bamboo.json");
        std::fs::write(&path, "plain text secret").unwrap();
        let reference = SecretRef::File(path);

        let loader = SecretLoader::for_refs(&[&reference], None).await;
        let err = loader
            .credential(&reference, BAMBOO_KEY_ALIASES)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bamboohr_api_key"));
    }

    #[tokio::test]
    #[serial]
    async fn test_env_credential() {
        std::env::set_var("ROSTER_TEST_BAMBOO_SECRET", r#"{"token":"from-env"}"#);
        let reference = SecretRef::Env("ROSTER_TEST_BAMBOO_SECRET".to_string());

        let loader = SecretLoader::for_refs(&[&reference], None).await;
        let key = loader.credential(&reference, BAMBOO_KEY_ALIASES).await;
        std::env::remove_var("ROSTER_TEST_BAMBOO_SECRET");

        assert_eq!(key.unwrap(), "from-env");
    }
}
