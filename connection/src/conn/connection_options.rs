use std::time::Duration;

use common::err::client_error::ClientError;
use common::err::CResult;

use crate::conn::ssl_options::SslOpts;
use crate::fault::ClientFaultCause;

/// 连接池里空闲连接的取用顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReuseStrategy {
    /// 后进先出, 长连接下缓存局部性更好
    #[default]
    Lifo,
    /// 先进先出, 多后端时摊平负载
    Fifo,
}

/// 单个服务端入口
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// 解析 `http://host[:port]` 形式的地址。https 默认 8443, http 默认 8123
    pub fn parse(uri: &str) -> CResult<Endpoint> {
        let (secure, rest) = if let Some(rest) = uri.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = uri.strip_prefix("http://") {
            (false, rest)
        } else {
            (false, uri)
        };
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(ClientError::UnknownOption(format!(
                "invalid endpoint '{}'",
                uri
            )));
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_text)) => {
                let port = port_text.parse::<u16>().map_err(|_| {
                    ClientError::UnknownOption(format!("invalid endpoint port '{}'", uri))
                })?;
                (host.to_string(), port)
            }
            None => (rest.to_string(), if secure { 8443 } else { 8123 }),
        };
        if host.is_empty() {
            return Err(ClientError::UnknownOption(format!(
                "invalid endpoint '{}'",
                uri
            )));
        }

        Ok(Endpoint { secure, host, port })
    }

    /// socket 连接地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 规范化 base URI, 也是 schema cache 的 key 前缀
    pub fn base_uri(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Settings used to connect to ClickHouse over HTTP.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// 服务端入口, 按序轮询。Defaults to localhost:8123
    pub endpoints: Vec<Endpoint>,

    /// Basic 认证用户。Defaults to "default"
    pub username: String,

    /// Basic 认证口令
    pub password: String,

    /// Bearer 凭证, 与口令认证互斥
    pub access_token: Option<String>,

    /// 以客户端证书做身份认证, 与前两种互斥
    pub ssl_auth: bool,

    /// Default database for the queries issued through this client.
    pub database: Option<String>,

    /// 会话 id, 拼进 query string
    pub session_id: Option<String>,

    /// 每个入口的连接数上限。Defaults to 10
    pub max_connections: usize,

    /// 连接总寿命硬上限, checkout 与归还时强制执行
    pub connection_ttl: Duration,

    /// 空闲寿命上限
    pub keep_alive: Duration,

    /// 等待空闲连接的超时
    pub connection_request_timeout: Duration,

    /// 单次读写的超时
    pub socket_timeout: Duration,

    /// 传输类故障的重试次数上限。Defaults to 3
    pub max_retries: usize,

    /// 参与重试的故障掩码
    pub retry_on_failures: ClientFaultCause,

    /// 额外参与重试的服务端错误码
    pub retry_server_codes: Vec<i32>,

    /// 空闲连接取用顺序
    pub reuse_strategy: ReuseStrategy,

    /// 压缩请求体
    pub compress_client_request: bool,

    /// 要求服务端压缩响应体
    pub compress_server_response: bool,

    /// 压缩走 HTTP Content-Encoding 还是 CH 原生帧
    pub use_http_compression: bool,

    /// User-Agent 的调用方前缀
    pub client_name: Option<String>,

    /// 客户端级自定义 header, per-call 覆盖
    pub http_headers: Vec<(String, String)>,

    /// 客户端级服务端 settings, per-call 覆盖
    pub server_settings: Vec<(String, String)>,

    /// Driver will require SSL connection if this option isn't `None` (default to `None`).
    pub ssl_opts: Option<SslOpts>,
}

impl Default for ConnectionOptions {
    fn default() -> ConnectionOptions {
        ConnectionOptions {
            endpoints: vec![Endpoint {
                secure: false,
                host: String::from("localhost"),
                port: 8123,
            }],
            username: String::from("default"),
            password: String::new(),
            access_token: None,
            ssl_auth: false,
            database: None,
            session_id: None,
            max_connections: 10,
            connection_ttl: Duration::from_secs(10 * 60),
            keep_alive: Duration::from_secs(3),
            connection_request_timeout: Duration::from_secs(10),
            socket_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_on_failures: ClientFaultCause::default(),
            retry_server_codes: Vec::new(),
            reuse_strategy: ReuseStrategy::default(),
            compress_client_request: false,
            compress_server_response: false,
            use_http_compression: false,
            client_name: None,
            http_headers: Vec::new(),
            server_settings: Vec::new(),
            ssl_opts: None,
        }
    }
}

impl ConnectionOptions {
    pub fn new_str(endpoint: &str, username: &str, password: &str) -> CResult<ConnectionOptions> {
        let mut options = ConnectionOptions::default();
        options.endpoints = vec![Endpoint::parse(endpoint)?];
        options.username = username.to_string();
        options.password = password.to_string();
        Ok(options)
    }

    pub fn with_endpoints(mut self, uris: &[&str]) -> CResult<Self> {
        let mut endpoints = Vec::with_capacity(uris.len());
        for uri in uris {
            endpoints.push(Endpoint::parse(uri)?);
        }
        self.endpoints = endpoints;
        Ok(self)
    }

    pub fn update_auth(&mut self, username: String, password: String) {
        self.username = username;
        self.password = password;
    }

    pub fn with_access_token(mut self, token: String) -> Self {
        self.access_token = Some(token);
        self
    }

    pub fn with_ssl_auth(mut self, ssl_opts: SslOpts) -> Self {
        self.ssl_auth = true;
        self.ssl_opts = Some(ssl_opts);
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_server_setting(mut self, key: &str, value: &str) -> Self {
        self.server_settings
            .push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_http_header(mut self, name: &str, value: &str) -> Self {
        self.http_headers.push((name.to_string(), value.to_string()));
        self
    }

    /// 认证方式互斥: 口令 / access token / 客户端证书 三选一
    pub fn validate(&self) -> CResult<()> {
        let mut modes = 0;
        if !self.password.is_empty() {
            modes += 1;
        }
        if self.access_token.is_some() {
            modes += 1;
        }
        if self.ssl_auth {
            modes += 1;
        }
        if modes > 1 {
            return Err(ClientError::ExclusiveAuth(String::from(
                "password, access_token and ssl_auth are mutually exclusive",
            )));
        }
        if self.ssl_auth && self.ssl_opts.is_none() {
            return Err(ClientError::ExclusiveAuth(String::from(
                "ssl_auth requires ssl options with a client identity",
            )));
        }
        if self.endpoints.is_empty() {
            return Err(ClientError::UnknownOption(String::from(
                "at least one endpoint is required",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use common::err::client_error::ClientError;

    use crate::conn::connection_options::{ConnectionOptions, Endpoint};
    use crate::conn::ssl_options::SslOpts;

    #[test]
    fn test_endpoint_parse() {
        let e = Endpoint::parse("http://ch1:8123").unwrap();
        assert_eq!(e.address(), "ch1:8123");
        assert!(!e.secure);

        let e = Endpoint::parse("https://ch2").unwrap();
        assert_eq!(e.port, 8443);
        assert!(e.secure);
        assert_eq!(e.base_uri(), "https://ch2:8443");

        let e = Endpoint::parse("ch3:9000").unwrap();
        assert_eq!(e.port, 9000);

        assert!(Endpoint::parse("http://").is_err());
        assert!(Endpoint::parse("http://host:badport").is_err());
    }

    #[test]
    fn test_exclusive_auth() {
        let mut options = ConnectionOptions::default();
        options.password = String::from("secret");
        assert!(options.validate().is_ok());

        let options = options.with_access_token(String::from("token"));
        assert!(matches!(
            options.validate(),
            Err(ClientError::ExclusiveAuth(_))
        ));

        let mut options = ConnectionOptions::default();
        options.access_token = Some(String::from("token"));
        let options = options.with_ssl_auth(SslOpts::default());
        assert!(matches!(
            options.validate(),
            Err(ClientError::ExclusiveAuth(_))
        ));
    }

    #[test]
    fn test_default_sane() {
        let options = ConnectionOptions::default();
        assert_eq!(options.endpoints.len(), 1);
        assert_eq!(options.max_connections, 10);
        assert!(options.validate().is_ok());
    }
}
