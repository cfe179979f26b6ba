use std::fs::File;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::{fmt, io, net};

use native_tls::{Certificate, TlsConnector};

use common::err::client_error::ClientError;
use common::err::CResult;

use crate::conn::connection_options::{ConnectionOptions, Endpoint};
use crate::fault::map_io;

/// HTTP/1.1 连接通道。
///
/// 一条 keep-alive 的 TCP/TLS 连接, 请求写入与响应头解析在这一层,
/// 响应体的分帧读取由上层的 body reader 驱动。
pub struct HttpChannel {
    stream: ChannelStream,
}

impl HttpChannel {
    pub fn connect(endpoint: &Endpoint, options: &ConnectionOptions) -> CResult<Self> {
        let stream = TcpStream::connect(endpoint.address()).map_err(|err| {
            ClientError::ConnectionError(format!(
                "can not connect {}. err:{{{err}}}",
                endpoint.address()
            ))
        })?;
        stream.set_read_timeout(Some(options.socket_timeout))?;
        stream.set_write_timeout(Some(options.socket_timeout))?;

        let channel = Self {
            stream: ChannelStream::Tcp(stream),
        };
        if endpoint.secure {
            channel.upgrade_to_tls(endpoint, options)
        } else {
            Ok(channel)
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.stream, ChannelStream::Tls(_))
    }

    pub fn shutdown(&mut self) {
        let _ = self.stream.shutdown();
    }

    /// 请求头 + 完整请求体一次写出
    pub fn write_request(&mut self, head: &str, body: &[u8]) -> CResult<()> {
        self.stream
            .write_all(head.as_bytes())
            .map_err(|err| map_io(err, "write request head"))?;
        if !body.is_empty() {
            self.stream
                .write_all(body)
                .map_err(|err| map_io(err, "write request body"))?;
        }
        self.stream
            .flush()
            .map_err(|err| map_io(err, "flush request"))?;
        Ok(())
    }

    /// 读状态行与响应头。对端一个字节都没回则归为 NoResponse
    pub fn read_head(&mut self) -> CResult<ResponseHead> {
        let status_line = self.read_line()?;
        let status = parse_status_line(&status_line)?;

        let mut headers = Vec::new();
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Ok(ResponseHead { status, headers })
    }

    /// 读一行, 去掉行尾 CRLF。chunk 大小行也走这里
    pub fn read_line(&mut self) -> CResult<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.stream
                .read_exact(&mut byte)
                .map_err(|err| map_io(err, "read response"))?;
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > 64 * 1024 {
                return Err(ClientError::ConnectionError(String::from(
                    "response header line is too long",
                )));
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line).map_err(ClientError::from)
    }

    fn upgrade_to_tls(self, endpoint: &Endpoint, options: &ConnectionOptions) -> CResult<Self> {
        let ssl_opts = options.ssl_opts.clone().unwrap_or_default();
        let domain = endpoint.host.clone();

        let mut builder = TlsConnector::builder();
        if let Some(root_cert_path) = ssl_opts.root_cert_path() {
            let mut root_cert_data = vec![];
            let mut root_cert_file = File::open(root_cert_path)?;
            root_cert_file.read_to_end(&mut root_cert_data)?;

            let root_certs = match Certificate::from_der(&root_cert_data)
                .map(|x| vec![x])
                .or_else(|_| {
                    pem::parse_many(&*root_cert_data)
                        .unwrap_or_default()
                        .iter()
                        .map(pem::encode)
                        .map(|s| Certificate::from_pem(s.as_bytes()))
                        .collect()
                }) {
                Ok(cert) => cert,
                Err(err) => {
                    return Err(ClientError::ConnectionError(format!(
                        "The ssl cert can not load. err:{{{err}}}"
                    )))
                }
            };

            for root_cert in root_certs {
                builder.add_root_certificate(root_cert);
            }
        }
        if let Some(client_identity) = ssl_opts.client_identity() {
            let identity = client_identity.load()?;
            builder.identity(identity);
        }
        builder.danger_accept_invalid_hostnames(ssl_opts.skip_domain_validation());
        builder.danger_accept_invalid_certs(ssl_opts.accept_invalid_certs());
        let tls_connector = match builder.build() {
            Ok(tls) => tls,
            Err(err) => {
                return Err(ClientError::ConnectionError(format!(
                    "Can not build tls. err:{{{err}}}"
                )))
            }
        };

        match self.stream {
            ChannelStream::Tcp(tcp_stream) => {
                let secure_stream = match tls_connector.connect(&domain, tcp_stream) {
                    Ok(stream) => stream,
                    Err(err) => {
                        return Err(ClientError::ConnectionError(format!(
                            "Can not connect tls. err:{{{err}}}"
                        )))
                    }
                };
                Ok(Self {
                    stream: ChannelStream::Tls(secure_stream),
                })
            }
            ChannelStream::Tls(_) => Ok(self),
        }
    }
}

impl Read for HttpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

/// 响应状态行与 header 的解析结果
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// header 名大小写不敏感
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn connection_close(&self) -> bool {
        self.header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }

    pub fn framing(&self) -> BodyFraming {
        if let Some(te) = self.header("Transfer-Encoding") {
            if te.to_ascii_lowercase().contains("chunked") {
                return BodyFraming::Chunked;
            }
        }
        if let Some(len) = self.header("Content-Length") {
            if let Ok(len) = len.trim().parse::<u64>() {
                return BodyFraming::Length(len);
            }
        }
        BodyFraming::Eof
    }
}

fn parse_status_line(line: &str) -> CResult<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(ClientError::ConnectionError(format!(
            "bad status line '{}'",
            line
        )));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| ClientError::ConnectionError(format!("bad status line '{}'", line)))
}

/// 响应体的分帧方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Length(u64),
    Chunked,
    /// 无长度信息, 读到连接关闭
    Eof,
}

enum ChannelStream {
    Tls(native_tls::TlsStream<net::TcpStream>),
    Tcp(net::TcpStream),
}

impl ChannelStream {
    pub fn shutdown(&mut self) -> io::Result<()> {
        match self {
            ChannelStream::Tcp(stream) => stream.shutdown(Shutdown::Both),
            ChannelStream::Tls(stream) => stream.shutdown(),
        }
    }
}

impl Write for ChannelStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ChannelStream::Tcp(stream) => stream.write(buf),
            ChannelStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ChannelStream::Tcp(stream) => stream.flush(),
            ChannelStream::Tls(stream) => stream.flush(),
        }
    }
}

impl Read for ChannelStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ChannelStream::Tcp(stream) => stream.read(buf),
            ChannelStream::Tls(stream) => stream.read(buf),
        }
    }
}

impl fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream {
            ChannelStream::Tcp(ref s) => write!(f, "Tcp stream {:?}", s),
            ChannelStream::Tls(ref s) => write!(f, "Tls stream {:?}", s),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::conn::http_channel::{parse_status_line, BodyFraming, ResponseHead};

    #[test]
    fn test_status_line() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK").unwrap(), 200);
        assert_eq!(parse_status_line("HTTP/1.0 500 Internal").unwrap(), 500);
        assert!(parse_status_line("SPDY/3 200").is_err());
    }

    #[test]
    fn test_head_lookup_and_framing() {
        let head = ResponseHead {
            status: 200,
            headers: vec![
                (String::from("content-length"), String::from("12")),
                (String::from("X-ClickHouse-Query-Id"), String::from("q1")),
            ],
        };
        assert_eq!(head.header("Content-Length"), Some("12"));
        assert_eq!(head.header("x-clickhouse-query-id"), Some("q1"));
        assert_eq!(head.framing(), BodyFraming::Length(12));
        assert!(!head.connection_close());

        let head = ResponseHead {
            status: 200,
            headers: vec![(
                String::from("Transfer-Encoding"),
                String::from("chunked"),
            )],
        };
        assert_eq!(head.framing(), BodyFraming::Chunked);

        let head = ResponseHead {
            status: 200,
            headers: vec![(String::from("Connection"), String::from("close"))],
        };
        assert_eq!(head.framing(), BodyFraming::Eof);
        assert!(head.connection_close());
    }
}
