//! Token minting and decoding.
//!
//! The string-to-sign and the query field order are part of the service
//! contract: any reordering makes the service reject the signature.

use super::permissions::SharedAccessPermissions;
use super::policy::{
    IpAddressOrRange, SasResource, SharedAccessHeaders, SharedAccessPolicy, SharedAccessProtocol,
};
use crate::auth::signing::{decode_account_key, sign_base64, signatures_match};
use crate::error::{FileShareError, Result};
use crate::utils::datetime::{format_sas_time, parse_sas_time};
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::form_urlencoded;

/// Everything but RFC 3986 unreserved characters.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Signed version (`sv`) of every token this crate mints.
pub const SIGNED_VERSION: &str = "2019-02-02";

/// The decoded fields of a shared access signature.
///
/// Times are kept as the exact strings that were signed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedAccessSignature {
    pub version: String,
    pub start: Option<String>,
    pub expiry: Option<String>,
    pub resource: String,
    pub permissions: String,
    pub ip: Option<String>,
    pub protocol: Option<String>,
    pub headers: SharedAccessHeaders,
    pub signature: String,
}

impl SharedAccessSignature {
    /// Canonical string-to-sign for this token against `canonical_resource`.
    pub fn string_to_sign(&self, canonical_resource: &str) -> String {
        let opt = |value: &Option<String>| value.clone().unwrap_or_default();

        [
            self.permissions.clone(),
            opt(&self.start),
            opt(&self.expiry),
            canonical_resource.to_string(),
            // signed identifier; stored access policies are not used
            String::new(),
            opt(&self.ip),
            opt(&self.protocol),
            self.version.clone(),
            opt(&self.headers.cache_control),
            opt(&self.headers.content_disposition),
            opt(&self.headers.content_encoding),
            opt(&self.headers.content_language),
            opt(&self.headers.content_type),
        ]
        .join("\n")
    }

    /// Query-string form, without a leading `?`. Values are
    /// percent-encoded, so a space is `%20`, never `+`.
    pub fn to_query(&self) -> String {
        let fields = [
            ("sv", Some(&self.version)),
            ("st", self.start.as_ref()),
            ("se", self.expiry.as_ref()),
            ("sr", Some(&self.resource)),
            ("sp", Some(&self.permissions)),
            ("sip", self.ip.as_ref()),
            ("spr", self.protocol.as_ref()),
            ("rscc", self.headers.cache_control.as_ref()),
            ("rscd", self.headers.content_disposition.as_ref()),
            ("rsce", self.headers.content_encoding.as_ref()),
            ("rscl", self.headers.content_language.as_ref()),
            ("rsct", self.headers.content_type.as_ref()),
            ("sig", Some(&self.signature)),
        ];

        fields
            .into_iter()
            .filter_map(|(name, value)| {
                value.map(|value| format!("{name}={}", utf8_percent_encode(value, QUERY_VALUE)))
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Decode a token from a query string (leading `?` optional).
    ///
    /// Unrelated query parameters are ignored.
    pub fn parse(query: &str) -> Result<Self> {
        let query = query.trim_start_matches('?');
        let mut sas = Self::default();

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match name.as_ref() {
                "sv" => sas.version = value,
                "st" => sas.start = Some(value),
                "se" => sas.expiry = Some(value),
                "sr" => sas.resource = value,
                "sp" => sas.permissions = value,
                "sip" => sas.ip = Some(value),
                "spr" => sas.protocol = Some(value),
                "rscc" => sas.headers.cache_control = Some(value),
                "rscd" => sas.headers.content_disposition = Some(value),
                "rsce" => sas.headers.content_encoding = Some(value),
                "rscl" => sas.headers.content_language = Some(value),
                "rsct" => sas.headers.content_type = Some(value),
                "sig" => sas.signature = value,
                _ => {}
            }
        }

        if sas.signature.is_empty() || sas.version.is_empty() {
            return Err(FileShareError::invalid_argument(
                "Shared access signature is missing 'sig' or 'sv'",
            ));
        }

        Ok(sas)
    }

    /// Recompute the signature with `key` and compare.
    pub fn verify(&self, canonical_resource: &str, key: &[u8]) -> Result<bool> {
        let expected = sign_base64(key, &self.string_to_sign(canonical_resource))?;
        Ok(signatures_match(&expected, &self.signature))
    }

    pub fn parsed_permissions(&self) -> Result<SharedAccessPermissions> {
        SharedAccessPermissions::parse(&self.permissions)
    }

    pub fn start_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.start.as_deref().map(parse_sas_time).transpose()
    }

    pub fn expiry_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.expiry.as_deref().map(parse_sas_time).transpose()
    }

    pub fn ip_restriction(&self) -> Result<Option<IpAddressOrRange>> {
        self.ip.as_deref().map(str::parse).transpose()
    }

    pub fn protocol_restriction(&self) -> Result<Option<SharedAccessProtocol>> {
        self.protocol
            .as_deref()
            .map(SharedAccessProtocol::parse)
            .transpose()
    }
}

/// Builder for shared access signature tokens.
#[derive(Debug, Clone)]
pub struct SharedAccessSignatureBuilder {
    resource: SasResource,
    policy: SharedAccessPolicy,
    headers: SharedAccessHeaders,
    protocol: Option<SharedAccessProtocol>,
    ip: Option<IpAddressOrRange>,
}

impl SharedAccessSignatureBuilder {
    pub fn new(resource: SasResource, policy: SharedAccessPolicy) -> Self {
        Self {
            resource,
            policy,
            headers: SharedAccessHeaders::default(),
            protocol: None,
            ip: None,
        }
    }

    pub fn headers(mut self, headers: SharedAccessHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn protocol(mut self, protocol: SharedAccessProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn ip(mut self, ip: IpAddressOrRange) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Mint the token, signing with the base64 `account_key`.
    pub fn build(&self, account_key: &str) -> Result<String> {
        Ok(self.sign(account_key)?.to_query())
    }

    /// Mint the token and return its decoded fields.
    pub fn sign(&self, account_key: &str) -> Result<SharedAccessSignature> {
        let key = decode_account_key(account_key)?;
        self.sign_with_key(&key)
    }

    /// Mint the token with an already decoded key.
    pub fn sign_with_key(&self, key: &[u8]) -> Result<SharedAccessSignature> {
        self.validate()?;

        let mut sas = SharedAccessSignature {
            version: SIGNED_VERSION.to_string(),
            start: self.policy.start.map(format_sas_time),
            expiry: self.policy.expiry.map(format_sas_time),
            resource: self.resource.signed_resource().to_string(),
            permissions: self.policy.permissions.to_permission_string(),
            ip: self.ip.map(|ip| ip.to_string()),
            protocol: self.protocol.map(|p| p.as_str().to_string()),
            headers: self.headers.clone(),
            signature: String::new(),
        };
        sas.signature = sign_base64(key, &sas.string_to_sign(&self.resource.canonical()))?;
        Ok(sas)
    }
}

impl SharedAccessSignatureBuilder {
    fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        if let Some(ip) = &self.ip {
            ip.validate()?;
        }
        Ok(())
    }
}

/// Mint a token in one call.
pub fn build_token(
    resource: SasResource,
    policy: SharedAccessPolicy,
    headers: Option<SharedAccessHeaders>,
    protocol: Option<SharedAccessProtocol>,
    ip: Option<IpAddressOrRange>,
    account_key: &str,
) -> Result<String> {
    let mut builder = SharedAccessSignatureBuilder::new(resource, policy);
    if let Some(headers) = headers {
        builder = builder.headers(headers);
    }
    if let Some(protocol) = protocol {
        builder = builder.protocol(protocol);
    }
    if let Some(ip) = ip {
        builder = builder.ip(ip);
    }
    builder.build(account_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KEY: &str = "Zmlyc3Qta2V5LWZvci10ZXN0cw==";

    fn resource() -> SasResource {
        SasResource::File {
            account: "acct".into(),
            share: "share".into(),
            path: "dir/file".into(),
        }
    }

    fn policy() -> SharedAccessPolicy {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expiry = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        SharedAccessPolicy::new(
            SharedAccessPermissions::READ | SharedAccessPermissions::WRITE,
            expiry,
        )
        .with_start(start)
    }

    #[test]
    fn test_token_is_pure_function_of_inputs() {
        let a = SharedAccessSignatureBuilder::new(resource(), policy()).build(KEY).unwrap();
        let b = SharedAccessSignatureBuilder::new(resource(), policy()).build(KEY).unwrap();
        assert_eq!(a, b);

        let other_scope = SasResource::File {
            account: "acct".into(),
            share: "share".into(),
            path: "dir/other".into(),
        };
        let c = SharedAccessSignatureBuilder::new(other_scope, policy()).build(KEY).unwrap();
        assert_ne!(
            SharedAccessSignature::parse(&a).unwrap().signature,
            SharedAccessSignature::parse(&c).unwrap().signature
        );
    }

    #[test]
    fn test_query_field_order() {
        let token = SharedAccessSignatureBuilder::new(resource(), policy())
            .protocol(SharedAccessProtocol::HttpsOnly)
            .ip("10.0.0.1-10.0.0.2".parse().unwrap())
            .headers(SharedAccessHeaders {
                content_type: Some("text/plain".into()),
                ..Default::default()
            })
            .build(KEY)
            .unwrap();

        let names: Vec<String> = form_urlencoded::parse(token.as_bytes())
            .map(|(name, _)| name.into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["sv", "st", "se", "sr", "sp", "sip", "spr", "rsct", "sig"]
        );
        assert!(token.contains("sp=rw"));
        assert!(token.contains("st=2024-01-01T00%3A00%3A00Z"));
    }

    #[test]
    fn test_query_values_are_percent_encoded() {
        let token = SharedAccessSignatureBuilder::new(resource(), policy())
            .protocol(SharedAccessProtocol::HttpsOrHttp)
            .headers(SharedAccessHeaders {
                content_disposition: Some("attachment; filename=a b.txt".into()),
                ..Default::default()
            })
            .build(KEY)
            .unwrap();

        assert!(token.contains("spr=https%2Chttp&"));
        assert!(token.contains("rscd=attachment%3B%20filename%3Da%20b.txt&"));
        assert!(!token.contains('+'));

        let parsed = SharedAccessSignature::parse(&token).unwrap();
        assert_eq!(
            parsed.headers.content_disposition.as_deref(),
            Some("attachment; filename=a b.txt")
        );
        let key = decode_account_key(KEY).unwrap();
        assert!(parsed.verify("/file/acct/share/dir/file", &key).unwrap());
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sas = SharedAccessSignatureBuilder::new(resource(), policy())
            .sign(KEY)
            .unwrap();
        let string_to_sign = sas.string_to_sign("/file/acct/share/dir/file");
        let lines: Vec<&str> = string_to_sign.split('\n').collect();

        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "rw");
        assert_eq!(lines[1], "2024-01-01T00:00:00Z");
        assert_eq!(lines[2], "2024-01-02T00:00:00Z");
        assert_eq!(lines[3], "/file/acct/share/dir/file");
        assert_eq!(lines[7], SIGNED_VERSION);
    }

    #[test]
    fn test_parse_and_verify() {
        let token = SharedAccessSignatureBuilder::new(resource(), policy()).build(KEY).unwrap();
        let sas = SharedAccessSignature::parse(&format!("?{token}")).unwrap();
        let key = decode_account_key(KEY).unwrap();

        assert!(sas.verify("/file/acct/share/dir/file", &key).unwrap());
        assert!(!sas.verify("/file/acct/share/dir/other", &key).unwrap());

        let mut tampered = sas.clone();
        tampered.permissions = "rwd".into();
        assert!(!tampered.verify("/file/acct/share/dir/file", &key).unwrap());
    }

    #[test]
    fn test_invalid_inputs_fail_locally() {
        let mut bad = policy();
        bad.permissions = SharedAccessPermissions::empty();
        assert!(matches!(
            SharedAccessSignatureBuilder::new(resource(), bad).build(KEY),
            Err(FileShareError::InvalidArgument(_))
        ));

        let mut inverted = policy();
        inverted.start = inverted.expiry;
        assert!(SharedAccessSignatureBuilder::new(resource(), inverted).build(KEY).is_err());

        assert!(SharedAccessSignatureBuilder::new(resource(), policy())
            .build("not base64!")
            .is_err());
    }
}
