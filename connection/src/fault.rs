use std::io;

use bitflags::bitflags;

use common::err::client_error::ClientError;

bitflags! {
    /// 可重试故障的分类掩码。retry_on_failures 选项以此配置
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientFaultCause: u32 {
        /// 服务端未返回任何字节就断开
        const NO_RESPONSE = 0b00001;
        /// 建连失败或建连超时
        const CONNECT = 0b00010;
        /// 等待连接池空闲连接超时
        const CONNECTION_REQUEST_TIMEOUT = 0b00100;
        /// 读写超时
        const SOCKET_TIMEOUT = 0b01000;
        /// 对端重置
        const CONNECTION_RESET = 0b10000;
    }
}

impl Default for ClientFaultCause {
    fn default() -> Self {
        ClientFaultCause::NO_RESPONSE
            | ClientFaultCause::CONNECT
            | ClientFaultCause::CONNECTION_REQUEST_TIMEOUT
    }
}

/// 故障归类。不可重试的错误返回 None
pub fn classify(err: &ClientError) -> Option<ClientFaultCause> {
    match err {
        ClientError::NoResponse(_) => Some(ClientFaultCause::NO_RESPONSE),
        ClientError::ConnectionError(_) => Some(ClientFaultCause::CONNECT),
        ClientError::ConnectionRequestTimeout(_) => {
            Some(ClientFaultCause::CONNECTION_REQUEST_TIMEOUT)
        }
        ClientError::SocketTimeout(_) => Some(ClientFaultCause::SOCKET_TIMEOUT),
        ClientError::ConnectionReset(_) => Some(ClientFaultCause::CONNECTION_RESET),
        _ => None,
    }
}

/// 连接已建立后的 io 错误映射
pub fn map_io(err: io::Error, context: &str) -> ClientError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            ClientError::NoResponse(format!("{}: empty response", context))
        }
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
            ClientError::ConnectionReset(format!("{}: {}", context, err))
        }
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            ClientError::SocketTimeout(format!("{}: {}", context, err))
        }
        _ => ClientError::IoError(err),
    }
}

/// 连接是否已不可复用, 必须关闭丢弃。其余故障的连接还回池
pub fn poisons_connection(cause: ClientFaultCause) -> bool {
    cause.intersects(ClientFaultCause::NO_RESPONSE | ClientFaultCause::CONNECTION_RESET)
}
