//! Certificate verification with per-host user overrides.
//!
//! The standard WebPKI verifier decides first. When it rejects a server
//! certificate the rejection is recorded so mount discovery can show it to
//! the user, and a stored override is honoured only when both the
//! certificate bytes and the error set match what the user accepted.

use log::{debug, warn};
use parking_lot::RwLock;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Bit set of reasons a certificate was rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CertificateErrors(u32);

impl CertificateErrors {
    pub const UNKNOWN_CA: CertificateErrors = CertificateErrors(1 << 0);
    pub const BAD_IDENTITY: CertificateErrors = CertificateErrors(1 << 1);
    pub const NOT_ACTIVATED: CertificateErrors = CertificateErrors(1 << 2);
    pub const EXPIRED: CertificateErrors = CertificateErrors(1 << 3);
    pub const REVOKED: CertificateErrors = CertificateErrors(1 << 4);
    pub const INSECURE: CertificateErrors = CertificateErrors(1 << 5);
    pub const GENERIC_ERROR: CertificateErrors = CertificateErrors(1 << 6);

    pub fn empty() -> Self {
        CertificateErrors(0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: CertificateErrors) -> bool {
        self.0 & other.0 == other.0
    }

    /// Classifies a rustls verification failure.
    pub fn from_rustls(err: &rustls::Error) -> Self {
        match err {
            rustls::Error::InvalidCertificate(cert_err) => match cert_err {
                CertificateError::UnknownIssuer => Self::UNKNOWN_CA,
                CertificateError::NotValidForName
                | CertificateError::NotValidForNameContext { .. } => Self::BAD_IDENTITY,
                CertificateError::NotValidYet | CertificateError::NotValidYetContext { .. } => {
                    Self::NOT_ACTIVATED
                }
                CertificateError::Expired | CertificateError::ExpiredContext { .. } => {
                    Self::EXPIRED
                }
                CertificateError::Revoked => Self::REVOKED,
                CertificateError::BadSignature => Self::INSECURE,
                _ => Self::GENERIC_ERROR,
            },
            _ => Self::GENERIC_ERROR,
        }
    }

    /// Human readable text for each set flag, in flag order.
    pub fn descriptions(self) -> Vec<&'static str> {
        const TEXT: [(CertificateErrors, &str); 7] = [
            (
                CertificateErrors::UNKNOWN_CA,
                "The signing certificate authority is not known.",
            ),
            (
                CertificateErrors::BAD_IDENTITY,
                "The certificate does not match the identity of the site.",
            ),
            (
                CertificateErrors::NOT_ACTIVATED,
                "The certificate's activation time is still in the future.",
            ),
            (CertificateErrors::EXPIRED, "The certificate has expired."),
            (
                CertificateErrors::REVOKED,
                "The certificate has been revoked.",
            ),
            (
                CertificateErrors::INSECURE,
                "The certificate's algorithm is considered insecure.",
            ),
            (
                CertificateErrors::GENERIC_ERROR,
                "Error occurred when validating the certificate.",
            ),
        ];
        TEXT.iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, text)| *text)
            .collect()
    }
}

impl std::ops::BitOr for CertificateErrors {
    type Output = CertificateErrors;

    fn bitor(self, rhs: CertificateErrors) -> CertificateErrors {
        CertificateErrors(self.0 | rhs.0)
    }
}

/// A certificate the user chose to trust despite `errors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateOverride {
    pub certificate: Vec<u8>,
    pub errors: CertificateErrors,
}

/// An accepted certificate and the number of mounts holding it.
struct Installed {
    accepted: CertificateOverride,
    holders: usize,
}

#[derive(Default)]
struct OverrideTable {
    accepted: HashMap<String, Installed>,
    rejected: HashMap<String, CertificateOverride>,
}

/// Host keyed table of accepted certificates and the latest rejection.
///
/// Every mount that accepts a certificate holds the host's entry until it
/// calls [`CertificateOverrides::release`]. Cheap to clone; clones share the
/// table.
#[derive(Clone, Default)]
pub struct CertificateOverrides {
    table: Arc<RwLock<OverrideTable>>,
}

impl CertificateOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one hold on `accepted` for `host`.
    ///
    /// A different certificate replaces the stored one; existing holds carry over.
    pub fn install(&self, host: &str, accepted: CertificateOverride) {
        debug!(
            "installing certificate override for {} ({:?})",
            host, accepted.errors
        );
        let mut table = self.table.write();
        let holders = table.accepted.get(host).map_or(0, |entry| entry.holders);
        table.accepted.insert(
            host.to_string(),
            Installed {
                accepted,
                holders: holders + 1,
            },
        );
    }

    /// Drops one hold on `host`. Returns `true` when the override is gone.
    pub fn release(&self, host: &str) -> bool {
        let mut table = self.table.write();
        let Some(entry) = table.accepted.get_mut(host) else {
            return true;
        };
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders == 0 {
            debug!("dropping certificate override for {}", host);
            table.accepted.remove(host);
            return true;
        }
        false
    }

    /// The override currently installed for `host`.
    pub fn accepted(&self, host: &str) -> Option<CertificateOverride> {
        self.table
            .read()
            .accepted
            .get(host)
            .map(|entry| entry.accepted.clone())
    }

    /// Whether `certificate` with `errors` was accepted for `host`, bit for bit.
    pub fn accepts(&self, host: &str, certificate: &[u8], errors: CertificateErrors) -> bool {
        match self.table.read().accepted.get(host) {
            Some(entry) => {
                entry.accepted.certificate == certificate && entry.accepted.errors == errors
            }
            None => false,
        }
    }

    pub fn record_rejection(&self, host: &str, certificate: &[u8], errors: CertificateErrors) {
        self.table.write().rejected.insert(
            host.to_string(),
            CertificateOverride {
                certificate: certificate.to_vec(),
                errors,
            },
        );
    }

    /// Removes and returns the last rejection seen for `host`.
    pub fn take_rejection(&self, host: &str) -> Option<CertificateOverride> {
        self.table.write().rejected.remove(host)
    }
}

impl fmt::Debug for CertificateOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        f.debug_struct("CertificateOverrides")
            .field("accepted", &table.accepted.keys().collect::<Vec<_>>())
            .field("rejected", &table.rejected.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn server_name_host(name: &ServerName<'_>) -> String {
    match name {
        ServerName::DnsName(dns) => dns.as_ref().to_ascii_lowercase(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        _ => String::new(),
    }
}

/// WebPKI verification that falls back to the override table.
pub struct OverridingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    overrides: CertificateOverrides,
}

impl OverridingVerifier {
    pub fn new(
        provider: Arc<CryptoProvider>,
        overrides: CertificateOverrides,
    ) -> Result<Self, rustls::client::VerifierBuilderError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider).build()?;
        Ok(Self { inner, overrides })
    }
}

impl fmt::Debug for OverridingVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverridingVerifier")
            .field("overrides", &self.overrides)
            .finish()
    }
}

impl ServerCertVerifier for OverridingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            Err(err) => {
                let host = server_name_host(server_name);
                let errors = CertificateErrors::from_rustls(&err);
                if self.overrides.accepts(&host, end_entity.as_ref(), errors) {
                    debug!("certificate for {} accepted by override", host);
                    return Ok(ServerCertVerified::assertion());
                }
                warn!("certificate for {} rejected: {}", host, err);
                self.overrides
                    .record_rejection(&host, end_entity.as_ref(), errors);
                Err(err)
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Client TLS configuration using [`OverridingVerifier`].
pub fn client_config(overrides: CertificateOverrides) -> Result<rustls::ClientConfig, String> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier =
        OverridingVerifier::new(provider.clone(), overrides).map_err(|e| e.to_string())?;
    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| e.to_string())?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}
