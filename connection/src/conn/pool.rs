use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use common::err::client_error::ClientError;
use common::err::CResult;

use crate::conn::connection_options::{ConnectionOptions, Endpoint, ReuseStrategy};
use crate::conn::http_channel::HttpChannel;

/// 池内连接与它的寿命记录
#[derive(Debug)]
pub struct PooledConnection {
    pub channel: HttpChannel,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(channel: HttpChannel) -> Self {
        let now = Instant::now();
        PooledConnection {
            channel,
            created_at: now,
            last_used: now,
        }
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

struct PoolInner {
    idle: VecDeque<PooledConnection>,
    in_use: usize,
}

/// 单入口连接池。
///
/// 空闲表由互斥锁保护, 满载时的等待走条件变量并以
/// connection_request_timeout 为限。TTL 与 keep-alive 在取用与归还
/// 两个点强制执行: 过龄的连接绝不外借, 直接关闭丢弃。
pub struct ConnectionPool {
    endpoint: Endpoint,
    options: Arc<ConnectionOptions>,
    inner: Mutex<PoolInner>,
    cond: Condvar,
    opened_total: AtomicU64,
}

impl ConnectionPool {
    pub fn new(endpoint: Endpoint, options: Arc<ConnectionOptions>) -> Self {
        ConnectionPool {
            endpoint,
            options,
            inner: Mutex::new(PoolInner {
                idle: VecDeque::new(),
                in_use: 0,
            }),
            cond: Condvar::new(),
            opened_total: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// 该池累计建立过的 socket 数
    pub fn opened_total(&self) -> u64 {
        self.opened_total.load(Ordering::Relaxed)
    }

    pub fn idle_len(&self) -> usize {
        self.inner.lock().unwrap().idle.len()
    }

    fn pop_idle(&self, inner: &mut PoolInner) -> Option<PooledConnection> {
        match self.options.reuse_strategy {
            ReuseStrategy::Lifo => inner.idle.pop_back(),
            ReuseStrategy::Fifo => inner.idle.pop_front(),
        }
    }

    /// 取用一条连接, 最多阻塞 connection_request_timeout
    pub fn checkout(&self) -> CResult<PooledConnection> {
        let deadline = Instant::now() + self.options.connection_request_timeout;
        let mut inner = self.inner.lock().unwrap();

        loop {
            while let Some(mut conn) = self.pop_idle(&mut inner) {
                if conn.age() >= self.options.connection_ttl
                    || conn.idle() >= self.options.keep_alive
                {
                    debug!(
                        "discard aged connection to {}. age:{:?} idle:{:?}",
                        self.endpoint.address(),
                        conn.age(),
                        conn.idle()
                    );
                    conn.channel.shutdown();
                    continue;
                }
                conn.touch();
                inner.in_use += 1;
                return Ok(conn);
            }

            if inner.idle.len() + inner.in_use < self.options.max_connections {
                inner.in_use += 1;
                drop(inner);
                // 建连不持锁
                return match HttpChannel::connect(&self.endpoint, &self.options) {
                    Ok(channel) => {
                        self.opened_total.fetch_add(1, Ordering::Relaxed);
                        Ok(PooledConnection::new(channel))
                    }
                    Err(err) => {
                        self.inner.lock().unwrap().in_use -= 1;
                        self.cond.notify_one();
                        Err(err)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::ConnectionRequestTimeout(format!(
                    "no free connection to {} within {:?}",
                    self.endpoint.address(),
                    self.options.connection_request_timeout
                )));
            }
            let (guard, _) = self
                .cond
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = guard;
        }
    }

    /// 归还连接。TTL 在归还点同样强制执行
    pub fn release(&self, mut conn: PooledConnection, reusable: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_use = inner.in_use.saturating_sub(1);

        if reusable && conn.age() < self.options.connection_ttl {
            conn.touch();
            inner.idle.push_back(conn);
        } else {
            conn.channel.shutdown();
        }
        drop(inner);
        self.cond.notify_one();
    }

    /// 连接已不可用, 关闭并释放池位
    pub fn discard(&self, mut conn: PooledConnection) {
        conn.channel.shutdown();
        let mut inner = self.inner.lock().unwrap();
        inner.in_use = inner.in_use.saturating_sub(1);
        drop(inner);
        self.cond.notify_one();
    }
}
