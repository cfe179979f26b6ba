use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use uuid::Uuid;

use crate::conn::connection_options::{ConnectionOptions, Endpoint};

/// 单次调用的请求参数。与客户端级默认值合并, 冲突时本次调用生效
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub query_id: Option<String>,

    pub session_id: Option<String>,

    /// 本次调用的服务端 settings
    pub settings: Vec<(String, String)>,

    /// 以这些角色执行, 逗号拼接进 query string
    pub roles: Vec<String>,

    /// 本次调用的自定义 header
    pub headers: Vec<(String, String)>,
}

impl QueryOptions {
    pub fn with_query_id(mut self, query_id: &str) -> Self {
        self.query_id = Some(query_id.to_string());
        self
    }

    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.roles.push(role.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// query string 的百分号转义。逗号保留, 角色列表等拼接值可读
pub fn percent_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b',' => {
                encoded.push(byte as char)
            }
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{:02X}", byte));
            }
        }
    }
    encoded
}

/// 左表为客户端默认, 右表为本次调用; 同 key 右表覆盖, 新 key 追加
pub fn merge_pairs(
    defaults: &[(String, String)],
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::with_capacity(defaults.len() + overrides.len());
    for (key, value) in defaults {
        let winner = overrides
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
            .unwrap_or(value);
        merged.push((key.clone(), winner.clone()));
    }
    for (key, value) in overrides {
        if !merged.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
            merged.push((key.clone(), value.clone()));
        }
    }
    merged
}

pub fn new_query_id() -> String {
    Uuid::new_v4().to_string()
}

/// 组装 query string。SQL 正文走请求体, 不进 URL
pub fn build_query_string(
    options: &ConnectionOptions,
    call: &QueryOptions,
    query_id: &str,
    format: Option<&str>,
) -> String {
    let mut params: Vec<(String, String)> = Vec::new();

    if let Some(database) = &options.database {
        params.push((String::from("database"), database.clone()));
    }
    params.push((String::from("query_id"), query_id.to_string()));

    let session = call.session_id.as_ref().or(options.session_id.as_ref());
    if let Some(session) = session {
        params.push((String::from("session_id"), session.clone()));
    }
    if let Some(format) = format {
        params.push((String::from("default_format"), format.to_string()));
    }

    params.extend(merge_pairs(&options.server_settings, &call.settings));

    if !call.roles.is_empty() {
        params.push((String::from("roles"), call.roles.join(",")));
    }

    // 压缩是黑盒流过滤器, 这里只负责协商参数
    if options.compress_server_response {
        if options.use_http_compression {
            params.push((String::from("enable_http_compression"), String::from("1")));
        } else {
            params.push((String::from("compress"), String::from("1")));
        }
    }
    if options.compress_client_request && !options.use_http_compression {
        params.push((String::from("decompress"), String::from("1")));
    }

    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn user_agent(client_name: Option<&str>) -> String {
    let prefix = match client_name {
        Some(name) => format!("{} ", name),
        None => String::new(),
    };
    format!(
        "{}{}/{} ({}) http/1.1",
        prefix,
        crate::PRODUCT_NAME,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

/// 请求 header 表。认证三选一: Basic / Bearer / 证书即身份不发 header
pub fn build_headers(
    options: &ConnectionOptions,
    endpoint: &Endpoint,
    call: &QueryOptions,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    headers.push((String::from("Host"), endpoint.address()));
    headers.push((
        String::from("User-Agent"),
        user_agent(options.client_name.as_deref()),
    ));

    if let Some(token) = &options.access_token {
        headers.push((String::from("Authorization"), format!("Bearer {}", token)));
    } else if !options.ssl_auth {
        let credential = format!("{}:{}", options.username, options.password);
        headers.push((
            String::from("Authorization"),
            format!("Basic {}", BASE64.encode(credential)),
        ));
    }

    for (name, value) in merge_pairs(&options.http_headers, &call.headers) {
        headers.push((name, value));
    }
    headers
}

/// 渲染请求头文本。请求体一律 Content-Length 定界
pub fn render_head(
    method: &str,
    path_and_query: &str,
    headers: &[(String, String)],
    body_len: usize,
) -> String {
    let mut head = format!("{} {} HTTP/1.1\r\n", method, path_and_query);
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n", body_len));
    head.push_str("\r\n");
    head
}

#[cfg(test)]
mod test {
    use crate::conn::connection_options::ConnectionOptions;
    use crate::request::{
        build_headers, build_query_string, merge_pairs, percent_encode, render_head, user_agent,
        QueryOptions,
    };

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("abc_1.2~"), "abc_1.2~");
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("r3,r2"), "r3,r2");
        assert_eq!(percent_encode("x=y&z"), "x%3Dy%26z");
    }

    #[test]
    fn test_per_call_setting_wins() {
        let options = ConnectionOptions::default()
            .with_server_setting("async_insert", "1");
        let call = QueryOptions::default()
            .with_setting("async_insert", "3")
            .with_role("r3")
            .with_role("r2");

        let qs = build_query_string(&options, &call, "q-1", None);
        assert!(qs.contains("async_insert=3"), "query string: {}", qs);
        assert!(!qs.contains("async_insert=1"));
        assert!(qs.contains("roles=r3,r2"));
        assert!(qs.contains("query_id=q-1"));
    }

    #[test]
    fn test_merge_appends_new_keys() {
        let defaults = vec![(String::from("a"), String::from("1"))];
        let overrides = vec![
            (String::from("A"), String::from("2")),
            (String::from("b"), String::from("3")),
        ];
        let merged = merge_pairs(&defaults, &overrides);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], (String::from("a"), String::from("2")));
        assert_eq!(merged[1], (String::from("b"), String::from("3")));
    }

    #[test]
    fn test_auth_header_modes() {
        let mut options = ConnectionOptions::default();
        options.username = String::from("default");
        options.password = String::from("pass");
        let endpoint = options.endpoints[0].clone();

        let headers = build_headers(&options, &endpoint, &QueryOptions::default());
        let auth = headers
            .iter()
            .find(|(n, _)| n == "Authorization")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(auth, format!("Basic {}", "ZGVmYXVsdDpwYXNz"));

        let options = ConnectionOptions::default().with_access_token(String::from("tok"));
        let headers = build_headers(&options, &endpoint, &QueryOptions::default());
        assert!(headers.iter().any(|(_, v)| v == "Bearer tok"));

        let mut options = ConnectionOptions::default();
        options.ssl_auth = true;
        let headers = build_headers(&options, &endpoint, &QueryOptions::default());
        assert!(!headers.iter().any(|(n, _)| n == "Authorization"));
    }

    #[test]
    fn test_per_call_header_wins() {
        let options = ConnectionOptions::default().with_http_header("X-Trace", "client");
        let call = QueryOptions::default().with_header("x-trace", "call");
        let endpoint = options.endpoints[0].clone();

        let headers = build_headers(&options, &endpoint, &call);
        let trace: Vec<_> = headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("x-trace"))
            .collect();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].1, "call");
    }

    #[test]
    fn test_user_agent_shape() {
        let ua = user_agent(Some("ingestd"));
        assert!(ua.starts_with("ingestd "));
        assert!(ua.contains("clickhouse-http-client/"));
        assert!(ua.ends_with("http/1.1"));
    }

    #[test]
    fn test_render_head() {
        let head = render_head(
            "POST",
            "/?query_id=1",
            &[(String::from("Host"), String::from("h:8123"))],
            5,
        );
        assert!(head.starts_with("POST /?query_id=1 HTTP/1.1\r\n"));
        assert!(head.contains("Host: h:8123\r\n"));
        assert!(head.ends_with("Content-Length: 5\r\n\r\n"));
    }
}
