//! Request authorization as the service performs it.

use super::handlers::{error_response, Route, Scope};
use crate::auth::signing::{sign_base64, signatures_match};
use crate::sas::{SharedAccessPermissions, SharedAccessSignature};
use crate::transport::shared_key::{parse_authorization, string_to_sign};
use crate::transport::{StorageRequest, StorageResponse};
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::net::Ipv4Addr;
use url::Url;

/// How a request proved who it is.
#[derive(Debug, Clone)]
pub(crate) enum Principal {
    SharedKey,
    Sas(SharedAccessSignature),
}

pub(crate) struct Authorizer<'a> {
    pub account: &'a str,
    pub key: &'a [u8],
    pub client_ip: Ipv4Addr,
}

type Denied = Box<StorageResponse>;

fn denied(code: &str, message: &str) -> Denied {
    Box::new(error_response(StatusCode::FORBIDDEN, code, message))
}

impl Authorizer<'_> {
    /// Authorize `request` for `required` access to `route`.
    pub fn authorize(
        &self,
        request: &StorageRequest,
        route: &Route,
        required: SharedAccessPermissions,
    ) -> Result<Principal, Denied> {
        if let Some(authorization) = request.header_str(AUTHORIZATION.as_str()) {
            self.verify_shared_key(request, authorization)?;
            return Ok(Principal::SharedKey);
        }

        let Some(query) = request.url.query().filter(|q| q.contains("sig=")) else {
            return Err(denied(
                "NoAuthenticationInformation",
                "Server failed to authenticate the request.",
            ));
        };
        let sas = SharedAccessSignature::parse(query)
            .map_err(|e| denied("AuthenticationFailed", &e.to_string()))?;
        self.verify_sas(&sas, &request.url, route, required)?;
        Ok(Principal::Sas(sas))
    }

    /// Authorize the source of a copy for reading.
    ///
    /// A source without a token is only accepted when the copy request
    /// itself was signed with the account key.
    pub fn authorize_copy_source(
        &self,
        source: &Url,
        route: &Route,
        destination: &Principal,
    ) -> Result<(), Denied> {
        let token = source.query().filter(|q| q.contains("sig="));
        match (token, destination) {
            (Some(query), _) => {
                let sas = SharedAccessSignature::parse(query)
                    .map_err(|e| denied("CannotVerifyCopySource", &e.to_string()))?;
                self.verify_sas(&sas, source, route, SharedAccessPermissions::READ)
                    .map_err(|_| {
                        denied(
                            "CannotVerifyCopySource",
                            "The copy source is not authorized for reading.",
                        )
                    })
            }
            (None, Principal::SharedKey) => Ok(()),
            (None, Principal::Sas(_)) => Err(denied(
                "CannotVerifyCopySource",
                "The copy source must carry its own authorization.",
            )),
        }
    }

    fn verify_shared_key(&self, request: &StorageRequest, authorization: &str) -> Result<(), Denied> {
        let failed = || {
            denied(
                "AuthenticationFailed",
                "Server failed to authenticate the request. Make sure the value of the Authorization header is formed correctly including the signature.",
            )
        };

        let (account, signature) = parse_authorization(authorization).ok_or_else(failed)?;
        if account != self.account {
            return Err(failed());
        }
        let expected = sign_base64(self.key, &string_to_sign(request, account)).map_err(|_| failed())?;
        if signatures_match(&expected, signature) {
            Ok(())
        } else {
            Err(failed())
        }
    }

    fn verify_sas(
        &self,
        sas: &SharedAccessSignature,
        url: &Url,
        route: &Route,
        required: SharedAccessPermissions,
    ) -> Result<(), Denied> {
        let canonical = match (sas.resource.as_str(), &route.scope) {
            ("s", _) => format!("/file/{}/{}", self.account, route.share),
            ("f", Scope::File(path)) => format!("/file/{}/{}/{}", self.account, route.share, path),
            ("f", _) => {
                return Err(denied(
                    "AuthorizationResourceTypeMismatch",
                    "This request is not authorized to perform this operation using this resource type.",
                ))
            }
            _ => {
                return Err(denied(
                    "AuthenticationFailed",
                    "Signed resource must be 's' or 'f'.",
                ))
            }
        };

        let signature_ok = sas.verify(&canonical, self.key).unwrap_or(false);
        if !signature_ok {
            return Err(denied(
                "AuthenticationFailed",
                "Signature did not match.",
            ));
        }

        let now = Utc::now();
        let start = sas.start_time().map_err(|e| denied("AuthenticationFailed", &e.to_string()))?;
        let expiry = sas.expiry_time().map_err(|e| denied("AuthenticationFailed", &e.to_string()))?;
        if start.is_some_and(|start| now < start) {
            return Err(denied("AuthenticationFailed", "Signature not valid in the specified time frame."));
        }
        if expiry.map_or(true, |expiry| now > expiry) {
            return Err(denied("AuthenticationFailed", "Signature not valid in the specified time frame."));
        }

        let ip = sas.ip_restriction().map_err(|e| denied("AuthenticationFailed", &e.to_string()))?;
        if ip.is_some_and(|ip| !ip.contains(self.client_ip)) {
            return Err(denied(
                "AuthorizationSourceIPMismatch",
                "This request is not authorized to perform this operation using this source IP.",
            ));
        }

        let protocol = sas
            .protocol_restriction()
            .map_err(|e| denied("AuthenticationFailed", &e.to_string()))?;
        if protocol.is_some_and(|protocol| !protocol.allows(url.scheme())) {
            return Err(denied(
                "AuthorizationProtocolMismatch",
                "This request is not authorized to perform this operation using this protocol.",
            ));
        }

        let granted = sas
            .parsed_permissions()
            .map_err(|e| denied("AuthenticationFailed", &e.to_string()))?;
        // List is only meaningful on a share-scoped token
        let effective = if sas.resource == "f" {
            granted - SharedAccessPermissions::LIST
        } else {
            granted
        };
        if !effective.contains(required) {
            return Err(denied(
                "AuthorizationPermissionMismatch",
                "This request is not authorized to perform this operation using this permission.",
            ));
        }

        Ok(())
    }
}
