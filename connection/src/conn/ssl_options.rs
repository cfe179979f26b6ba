use std::path::Path;

use native_tls::Identity;

use common::err::client_error::ClientError;
use common::err::CResult;

/// Ssl 配置.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct SslOpts {
    client_identity: Option<ClientIdentity>,
    root_cert_path: Option<String>,
    skip_domain_validation: bool,
    accept_invalid_certs: bool,
}

/// SSL配置属性
impl SslOpts {
    /// 设置 client identity.
    pub fn with_client_identity(mut self, identity: Option<ClientIdentity>) -> Self {
        self.client_identity = identity;
        self
    }

    /// 设置证书路径
    ///
    /// 支持证书格式 .der .pem.
    /// ,pem证书中允许多个证书
    pub fn with_root_cert_path(mut self, root_cert_path: Option<String>) -> Self {
        self.root_cert_path = root_cert_path;
        self
    }

    /// 不验证服务器域
    /// (defaults to `false`).
    pub fn with_danger_skip_domain_validation(mut self, value: bool) -> Self {
        self.skip_domain_validation = value;
        self
    }

    /// true时接受无效证书
    /// (defaults to `false`).
    pub fn with_danger_accept_invalid_certs(mut self, value: bool) -> Self {
        self.accept_invalid_certs = value;
        self
    }

    pub fn client_identity(&self) -> Option<&ClientIdentity> {
        self.client_identity.as_ref()
    }

    pub fn root_cert_path(&self) -> Option<&Path> {
        self.root_cert_path.as_ref().map(Path::new)
    }

    pub fn skip_domain_validation(&self) -> bool {
        self.skip_domain_validation
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}

/// 客户端证书身份。PEM 证书 + PKCS#8 私钥
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    cert_path: String,
    key_path: String,
}

impl ClientIdentity {
    pub fn new(cert_path: String, key_path: String) -> Self {
        Self {
            cert_path,
            key_path,
        }
    }

    pub fn cert_path(&self) -> &Path {
        Path::new(&self.cert_path)
    }

    pub fn key_path(&self) -> &Path {
        Path::new(&self.key_path)
    }

    pub(crate) fn load(&self) -> CResult<Identity> {
        let cert = std::fs::read(&self.cert_path)?;
        let key = std::fs::read(&self.key_path)?;
        match Identity::from_pkcs8(&cert, &key) {
            Ok(identity) => Ok(identity),
            Err(err) => Err(ClientError::ConnectionError(format!(
                "Can not load identity. err:{{{err}}}"
            ))),
        }
    }
}
