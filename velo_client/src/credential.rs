// velo_client/src/credential.rs

//! 会话凭证读取。
//!
//! 凭证由外部 (HTTP 登录流程) 写入 cookie 风格的键值串，客户端只负责读取。
//! 每次查询都重新读取来源，不做缓存，因此外部登录或登出后立即生效。

use log::{debug, warn};
use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::rc::Rc;

/// 会话凭证在 cookie 串中的键名。
pub const CREDENTIAL_KEY: &str = "Velo.JWT";

/// 在 `"k1=v1; k2=v2"` 形式的 cookie 串中查找 `key` 对应的值。
///
/// 值取第一个 `=` 之后的全部文本；键存在但值为空时返回 `Some("")`。
pub fn lookup_credential(cookies: &str, key: &str) -> Option<String> {
    let prefix = format!("{}=", key);
    cookies
        .split("; ")
        .find(|row| row.starts_with(&prefix))
        .map(|row| row[prefix.len()..].to_string())
}

/// cookie 风格键值串的来源。
pub trait CookieSource {
    /// 返回当前完整的 cookie 串，来源不可用时返回空串。
    fn cookie_header(&self) -> String;
}

/// 内存中的 cookie 串，可在运行时替换。
#[derive(Debug, Default)]
pub struct StaticCookies {
    header: RefCell<String>,
}

impl StaticCookies {
    pub fn new(header: impl Into<String>) -> Self {
        Self { header: RefCell::new(header.into()) }
    }

    pub fn set(&self, header: impl Into<String>) {
        *self.header.borrow_mut() = header.into();
    }

    pub fn clear(&self) {
        self.header.borrow_mut().clear();
    }
}

impl CookieSource for StaticCookies {
    fn cookie_header(&self) -> String {
        self.header.borrow().clone()
    }
}

/// 从文件读取 cookie 串 (取第一行非空内容)，每次调用都重新读取。
#[derive(Debug, Clone)]
pub struct CookieFile {
    path: PathBuf,
}

impl CookieFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CookieSource for CookieFile {
    fn cookie_header(&self) -> String {
        match fs::read_to_string(&self.path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or_default()
                .to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("[VeloClient] cookie 文件 {:?} 不存在，视为无凭证", self.path);
                String::new()
            }
            Err(e) => {
                warn!("[VeloClient] 读取 cookie 文件 {:?} 失败: {}，视为无凭证", self.path, e);
                String::new()
            }
        }
    }
}

/// 会话凭证存储，只读。
#[derive(Clone)]
pub struct CredentialStore {
    source: Rc<dyn CookieSource>,
    key: String,
}

impl CredentialStore {
    pub fn new(source: Rc<dyn CookieSource>) -> Self {
        Self::with_key(source, CREDENTIAL_KEY)
    }

    pub fn with_key(source: Rc<dyn CookieSource>, key: impl Into<String>) -> Self {
        Self { source, key: key.into() }
    }

    pub fn credential(&self) -> Option<String> {
        lookup_credential(&self.source.cookie_header(), &self.key)
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }
}
