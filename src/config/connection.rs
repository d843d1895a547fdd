//! Storage connection strings (`AccountName=..;AccountKey=..;...`).

use super::ClientConfig;
use crate::error::{FileShareError, Result};
use std::collections::HashMap;

fn parse_pairs(connection_string: &str) -> Result<HashMap<String, String>> {
    connection_string
        .trim()
        .replace('\n', "")
        .split(';')
        .filter(|field| !field.trim().is_empty())
        .map(|field| {
            // Keys and tokens are base64 / query strings and may contain '='
            let (key, value) = field.trim().split_once('=').ok_or_else(|| {
                FileShareError::config(format!(
                    "Invalid connection string, expected '=' in field: {field}"
                ))
            })?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn endpoint_from_parts(pairs: &HashMap<String, String>) -> Result<Option<String>> {
    let Some(account) = pairs.get("AccountName") else {
        return Ok(None);
    };
    let protocol = pairs
        .get("DefaultEndpointsProtocol")
        .map(String::as_str)
        .unwrap_or("https");
    if protocol != "http" && protocol != "https" {
        return Err(FileShareError::config(format!(
            "Invalid DefaultEndpointsProtocol: {protocol}"
        )));
    }
    let suffix = pairs
        .get("EndpointSuffix")
        .map(String::as_str)
        .unwrap_or("core.windows.net");
    Ok(Some(format!("{protocol}://{account}.file.{suffix}/")))
}

impl ClientConfig {
    /// Settings from a connection string. Fields it does not mention keep
    /// their defaults.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let pairs = parse_pairs(connection_string)?;

        let file_endpoint = match pairs.get("FileEndpoint") {
            Some(endpoint) => Some(endpoint.clone()),
            None => endpoint_from_parts(&pairs)?,
        };
        let account_name = pairs.get("AccountName").cloned().unwrap_or_default();
        if account_name.is_empty() && file_endpoint.is_none() {
            return Err(FileShareError::config(
                "Connection string needs AccountName or FileEndpoint",
            ));
        }

        let secondary_endpoint = match (pairs.get("FileSecondaryEndpoint"), pairs.get("FileEndpoint")) {
            (Some(endpoint), _) => Some(endpoint.clone()),
            // Derived endpoints get the conventional secondary host
            (None, None) if !account_name.is_empty() => file_endpoint
                .as_ref()
                .map(|primary| primary.replacen(&format!("://{account_name}."), &format!("://{account_name}-secondary."), 1)),
            _ => None,
        };

        Ok(Self {
            account_name,
            account_key: pairs.get("AccountKey").cloned(),
            sas_token: pairs.get("SharedAccessSignature").cloned(),
            file_endpoint,
            secondary_endpoint,
            ..Self::default()
        })
    }
}
