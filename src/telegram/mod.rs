pub mod bridge;

use crate::error::TeleshellError;
use bridge::TelegramCredentials;
use std::env;

pub fn resolve_credentials() -> Result<TelegramCredentials, TeleshellError> {
    resolve_credentials_with(&|var| env::var(var).ok())
}

/// Both variables must be present; the id must be numeric. Every missing or
/// unusable variable is named in the error.
pub fn resolve_credentials_with(
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<TelegramCredentials, TeleshellError> {
    let api_id = lookup("TELEGRAM_API_ID")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v.parse::<i64>().is_ok());
    let api_hash = lookup("TELEGRAM_API_HASH")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match (api_id, api_hash) {
        (Some(api_id), Some(api_hash)) => Ok(TelegramCredentials { api_id, api_hash }),
        (api_id, api_hash) => {
            let mut missing = Vec::new();
            if api_id.is_none() {
                missing.push("TELEGRAM_API_ID".to_string());
            }
            if api_hash.is_none() {
                missing.push("TELEGRAM_API_HASH".to_string());
            }
            Err(TeleshellError::MissingCredentials(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_variables_resolve() {
        let lookup = |var: &str| match var {
            "TELEGRAM_API_ID" => Some(" 12345 ".to_string()),
            "TELEGRAM_API_HASH" => Some("abcdef".to_string()),
            _ => None,
        };
        let creds = resolve_credentials_with(&lookup).expect("creds");
        assert_eq!(creds.api_id, "12345");
        assert_eq!(creds.api_hash, "abcdef");
    }

    #[test]
    fn every_missing_variable_is_named() {
        let err = resolve_credentials_with(&|_| None).expect_err("missing");
        assert_eq!(
            err,
            TeleshellError::MissingCredentials(vec![
                "TELEGRAM_API_ID".to_string(),
                "TELEGRAM_API_HASH".to_string()
            ])
        );
    }

    #[test]
    fn non_numeric_api_id_counts_as_missing() {
        let lookup = |var: &str| match var {
            "TELEGRAM_API_ID" => Some("abc".to_string()),
            "TELEGRAM_API_HASH" => Some("hash".to_string()),
            _ => None,
        };
        assert_eq!(
            resolve_credentials_with(&lookup).expect_err("invalid"),
            TeleshellError::MissingCredentials(vec!["TELEGRAM_API_ID".to_string()])
        );
    }
}
