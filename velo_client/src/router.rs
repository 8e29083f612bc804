// velo_client/src/router.rs

//! 路由表与导航守卫。
//!
//! 守卫在每次路由切换前同步执行，只读取会话凭证，与遥测通道的状态无关：
//!
//! | 目标路由 | 有凭证 | 无凭证 |
//! |---|---|---|
//! | `requires_auth` | 放行 | 重定向到登录页 |
//! | `guest` | 重定向到首页 | 放行 |
//! | 其他 / 未知路径 | 放行 | 放行 |

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::credential::CredentialStore;

pub const HOME_ROUTE: &str = "Home";
pub const LOGIN_ROUTE: &str = "Login";
pub const DETAIL_ROUTE: &str = "Detail";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub guest: bool,
}

impl RouteMeta {
    pub const fn requires_auth() -> Self {
        Self { requires_auth: true, guest: false }
    }

    pub const fn guest() -> Self {
        Self { requires_auth: false, guest: true }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub meta: RouteMeta,
}

impl Route {
    pub fn new(name: impl Into<String>, path: impl Into<String>, meta: RouteMeta) -> Self {
        Self { name: name.into(), path: path.into(), meta }
    }
}

/// 守卫的决策结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    /// 重定向到指定名称的路由。
    RedirectTo(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteTableError {
    /// 该路由的元数据会让守卫反复重定向。
    #[error("路由 '{route}' 会导致重定向循环")]
    RedirectLoop { route: String },

    #[error("路由名称或路径重复: '{0}'")]
    DuplicateRoute(String),

    #[error("路由 '{0}' 不存在")]
    MissingRoute(String),
}

/// 经过校验的路由表。
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    home: String,
    login: String,
}

impl RouteTable {
    /// 创建路由表并在构造时完成全部校验。
    ///
    /// # Errors
    /// * `RedirectLoop` - 某个路由同时标记了 `requires_auth` 与 `guest`，
    ///   或首页是 `guest`、登录页是 `requires_auth`。
    /// * `DuplicateRoute` - 名称或路径重复。
    /// * `MissingRoute` - `home` 或 `login` 指向的路由不存在。
    pub fn new(routes: Vec<Route>, home: impl Into<String>, login: impl Into<String>) -> Result<Self, RouteTableError> {
        let home = home.into();
        let login = login.into();

        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        for route in &routes {
            if route.meta.requires_auth && route.meta.guest {
                return Err(RouteTableError::RedirectLoop { route: route.name.clone() });
            }
            if !names.insert(route.name.as_str()) {
                return Err(RouteTableError::DuplicateRoute(route.name.clone()));
            }
            if !paths.insert(route.path.as_str()) {
                return Err(RouteTableError::DuplicateRoute(route.path.clone()));
            }
        }

        let table = Self { routes, home, login };
        let home_route = table
            .route(&table.home)
            .ok_or_else(|| RouteTableError::MissingRoute(table.home.clone()))?;
        if home_route.meta.guest {
            return Err(RouteTableError::RedirectLoop { route: home_route.name.clone() });
        }
        let login_route = table
            .route(&table.login)
            .ok_or_else(|| RouteTableError::MissingRoute(table.login.clone()))?;
        if login_route.meta.requires_auth {
            return Err(RouteTableError::RedirectLoop { route: login_route.name.clone() });
        }
        Ok(table)
    }

    /// Velo 客户端的默认路由：首页、登录页、设备详情页。
    pub fn velo_default() -> Self {
        Self {
            routes: vec![
                Route::new(HOME_ROUTE, "/", RouteMeta::requires_auth()),
                Route::new(LOGIN_ROUTE, "/login", RouteMeta::guest()),
                Route::new(DETAIL_ROUTE, "/detail", RouteMeta::requires_auth()),
            ],
            home: HOME_ROUTE.to_string(),
            login: LOGIN_ROUTE.to_string(),
        }
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.name == name)
    }

    /// 按路径查找路由，忽略查询串和片段。
    pub fn find_by_path(&self, path: &str) -> Option<&Route> {
        let path = path.split(|c| c == '?' || c == '#').next().unwrap_or(path);
        self.routes.iter().find(|route| route.path == path)
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// 导航守卫，在每次路由切换前调用。
#[derive(Clone)]
pub struct NavigationGuard {
    routes: RouteTable,
    credentials: CredentialStore,
}

impl NavigationGuard {
    pub fn new(routes: RouteTable, credentials: CredentialStore) -> Self {
        Self { routes, credentials }
    }

    /// 决定是否放行到 `target_path`。结果只取决于目标路由和当前凭证，与 `current_path` 无关。
    pub fn before_each(&self, target_path: &str, current_path: &str) -> Decision {
        let Some(target) = self.routes.find_by_path(target_path) else {
            debug!("[VeloClient] 路径 {} 没有对应路由，直接放行", target_path);
            return Decision::Proceed;
        };

        let has_credential = self.credentials.has_credential();
        let decision = if target.meta.requires_auth && !has_credential {
            Decision::RedirectTo(self.routes.login().to_string())
        } else if target.meta.guest && has_credential {
            Decision::RedirectTo(self.routes.home().to_string())
        } else {
            Decision::Proceed
        };
        debug!(
            "[VeloClient] 导航 {} -> {} (路由 {}, 凭证: {}): {:?}",
            current_path, target_path, target.name, has_credential, decision
        );
        decision
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCookies;
    use std::rc::Rc;

    fn guard_with(cookies: &str) -> NavigationGuard {
        let store = CredentialStore::new(Rc::new(StaticCookies::new(cookies)));
        NavigationGuard::new(RouteTable::velo_default(), store)
    }

    #[test]
    fn test_default_table_passes_validation() {
        let table = RouteTable::velo_default();
        let validated = RouteTable::new(table.routes().to_vec(), HOME_ROUTE, LOGIN_ROUTE);
        assert!(validated.is_ok(), "默认路由表应通过校验: {:?}", validated.err());
    }

    #[test]
    fn test_protected_route_without_credential_redirects_to_login() {
        let guard = guard_with("theme=dark");
        for current in ["/", "/login", "/detail", "/elsewhere"] {
            assert_eq!(
                guard.before_each("/", current),
                Decision::RedirectTo(LOGIN_ROUTE.to_string()),
                "无凭证访问首页应重定向到登录页 (当前路由: {})",
                current
            );
        }
        assert_eq!(guard.before_each("/detail?imei=123", "/"), Decision::RedirectTo(LOGIN_ROUTE.to_string()));
        assert_eq!(guard.before_each("/login", "/"), Decision::Proceed);
    }

    #[test]
    fn test_guest_route_with_credential_redirects_home() {
        let guard = guard_with("Velo.JWT=abc");
        assert_eq!(guard.routes().home(), HOME_ROUTE);
        for current in ["/", "/login", "/detail"] {
            assert_eq!(guard.before_each("/login", current), Decision::RedirectTo(HOME_ROUTE.to_string()));
        }
        assert_eq!(guard.before_each("/", "/login"), Decision::Proceed);
        assert_eq!(guard.before_each("/detail", "/"), Decision::Proceed);
    }

    #[test]
    fn test_empty_credential_counts_as_present() {
        let guard = guard_with("Velo.JWT=");
        assert_eq!(guard.before_each("/", "/login"), Decision::Proceed);
        assert_eq!(guard.before_each("/login", "/"), Decision::RedirectTo(HOME_ROUTE.to_string()));
    }

    #[test]
    fn test_unknown_path_proceeds() {
        assert_eq!(guard_with("").before_each("/settings", "/"), Decision::Proceed);
        assert_eq!(guard_with("Velo.JWT=abc").before_each("/settings", "/"), Decision::Proceed);
    }

    #[test]
    fn test_invalid_tables_are_rejected() {
        let both = RouteMeta { requires_auth: true, guest: true };
        let result = RouteTable::new(
            vec![Route::new("Home", "/", RouteMeta::requires_auth()), Route::new("Login", "/login", both)],
            "Home",
            "Login",
        );
        assert_eq!(result.err(), Some(RouteTableError::RedirectLoop { route: "Login".to_string() }));

        let result = RouteTable::new(
            vec![Route::new("Home", "/", RouteMeta::requires_auth()), Route::new("Home", "/other", RouteMeta::guest())],
            "Home",
            "Home",
        );
        assert_eq!(result.err(), Some(RouteTableError::DuplicateRoute("Home".to_string())));

        let result = RouteTable::new(
            vec![Route::new("Home", "/", RouteMeta::requires_auth()), Route::new("Login", "/", RouteMeta::guest())],
            "Home",
            "Login",
        );
        assert_eq!(result.err(), Some(RouteTableError::DuplicateRoute("/".to_string())));

        let result = RouteTable::new(vec![Route::new("Home", "/", RouteMeta::requires_auth())], "Home", "Login");
        assert_eq!(result.err(), Some(RouteTableError::MissingRoute("Login".to_string())));

        let result = RouteTable::new(
            vec![Route::new("Home", "/", RouteMeta::requires_auth()), Route::new("Login", "/login", RouteMeta::requires_auth())],
            "Home",
            "Login",
        );
        assert_eq!(result.err(), Some(RouteTableError::RedirectLoop { route: "Login".to_string() }));
    }
}
