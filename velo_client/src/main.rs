// velo_client/src/main.rs

use anyhow::{Context, Result};
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::rc::Rc;
use tokio::task::LocalSet;
use velo_models::TelemetryKind;

use velo_client::config::{AppConfig, DEFAULT_CONFIG_FILE};
use velo_client::{
    CookieFile, CookieSource, CredentialStore, NavigationGuard, RouteTable, StaticCookies, SubscriberRegistry,
    TelemetryChannel,
};

/// `velo-client [配置文件路径]`
///
/// 1. 初始化日志并加载配置。
/// 2. 构建凭证存储与导航守卫，记录首页和登录页的守卫决策。
/// 3. 创建遥测通道，订阅全部种类的记录并写入日志，运行到 Ctrl-C 后关闭通道。
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. 日志：默认 Info，工作区内的 crate 输出 Debug，RUST_LOG 可覆盖
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("velo_client", LevelFilter::Debug)
        .filter_module("velo_models", LevelFilter::Debug)
        .filter_module("rust_websocket_utils", LevelFilter::Debug)
        .parse_default_env()
        .try_init()
        .expect("初始化 env_logger 日志服务失败 (velo-client)");

    info!("[VeloClient] Velo 遥测客户端正在启动...");

    // 2. 配置：命令行第一个参数，缺省为当前目录下的配置文件
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = AppConfig::load_or_default(&config_path)?;

    // 3. 凭证来源与导航守卫
    let cookies: Rc<dyn CookieSource> = match &config.session.cookie_file {
        Some(path) => Rc::new(CookieFile::new(path)),
        None => Rc::new(StaticCookies::default()),
    };
    let guard = NavigationGuard::new(RouteTable::velo_default(), CredentialStore::new(cookies));
    for route in guard.routes().routes() {
        info!(
            "[VeloClient] 导航到 {} ({}) 的守卫决策: {:?}",
            route.path,
            route.name,
            guard.before_each(&route.path, "/")
        );
    }

    // 4. 订阅者：把所有记录和通道事件写入日志
    let registry = SubscriberRegistry::new();
    for kind in TelemetryKind::ALL {
        registry.subscribe(kind, None, |record| {
            let json = serde_json::to_string(record).context("序列化遥测记录失败")?;
            info!("[VeloClient] 收到遥测记录: {}", json);
            Ok(())
        });
    }
    registry.on_channel_event(|event| {
        info!("[VeloClient] 通道事件: {:?}", event);
        Ok(())
    });

    let channel = TelemetryChannel::connect(
        &config.telemetry.endpoint,
        config.telemetry.connect_options(),
        registry,
    )
    .context("创建遥测通道失败")?;

    // 5. 通道只能在本线程上运行，放进 LocalSet
    let local = LocalSet::new();
    local
        .run_until(async move {
            let runner = channel.clone();
            let mut handle = tokio::task::spawn_local(async move { runner.run().await });

            tokio::select! {
                result = &mut handle => {
                    result.context("遥测通道任务异常结束")?;
                    info!("[VeloClient] 遥测通道已终止，程序退出");
                }
                // Ctrl-C：先关闭通道，再等运行循环退出
                signal = tokio::signal::ctrl_c() => {
                    signal.context("监听 Ctrl-C 信号失败")?;
                    info!("[VeloClient] 收到 Ctrl-C，正在关闭遥测通道...");
                    channel.close();
                    handle.await.context("遥测通道任务异常结束")?;
                }
            }
            Ok::<(), anyhow::Error>(())
        })
        .await
}
