// velo_client/src/registry.rs

//! 订阅者注册表：把解码后的遥测记录分发给界面层回调。
//!
//! 注册表是一个可克隆的句柄 (`Rc<RefCell<..>>`)，只在通道所在的线程上使用。
//! 分发时先收集匹配的回调并释放内部借用，再逐个调用，
//! 因此回调内部可以安全地订阅、退订，或调用通道的 `close()`。
//! 对注册表的修改从下一次分发开始生效。

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use uuid::Uuid;
use velo_models::{DeviceIdentity, TelemetryKind, TelemetryRecord};

use crate::event::ChannelEvent;

pub type SubscriptionId = Uuid;

type RecordCallback = Rc<RefCell<dyn FnMut(&TelemetryRecord) -> anyhow::Result<()>>>;
type EventCallback = Rc<RefCell<dyn FnMut(&ChannelEvent) -> anyhow::Result<()>>>;

/// 某台设备某类消息的最新快照。
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRecord {
    pub record: TelemetryRecord,
    pub received_at: DateTime<Utc>,
}

struct RecordSubscription {
    id: SubscriptionId,
    kind: TelemetryKind,
    /// `None` 表示接收该种类的所有设备。
    filter: Option<DeviceIdentity>,
    callback: RecordCallback,
}

impl RecordSubscription {
    fn matches(&self, record: &TelemetryRecord) -> bool {
        self.kind == record.kind() && self.filter.as_ref().map_or(true, |identity| identity == record.identity())
    }
}

struct EventSubscription {
    id: SubscriptionId,
    callback: EventCallback,
}

#[derive(Default)]
struct RegistryInner {
    record_subscribers: Vec<RecordSubscription>,
    event_subscribers: Vec<EventSubscription>,
    latest: HashMap<(TelemetryKind, DeviceIdentity), LatestRecord>,
}

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅某一种类的记录，可选地只接收指定设备的记录。
    pub fn subscribe<F>(&self, kind: TelemetryKind, identity: Option<DeviceIdentity>, callback: F) -> SubscriptionId
    where
        F: FnMut(&TelemetryRecord) -> anyhow::Result<()> + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.borrow_mut().record_subscribers.push(RecordSubscription {
            id,
            kind,
            filter: identity,
            callback: Rc::new(RefCell::new(callback)),
        });
        debug!("[VeloClient] 新增订阅 {} (种类: {})", id, kind);
        id
    }

    /// 订阅通道生命周期事件。
    pub fn on_channel_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChannelEvent) -> anyhow::Result<()> + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.borrow_mut().event_subscribers.push(EventSubscription {
            id,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// 取消订阅，返回该订阅是否存在。
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.record_subscribers.len() + inner.event_subscribers.len();
        inner.record_subscribers.retain(|sub| sub.id != id);
        inner.event_subscribers.retain(|sub| sub.id != id);
        before != inner.record_subscribers.len() + inner.event_subscribers.len()
    }

    /// 某设备某种类的最新记录。
    pub fn latest(&self, kind: TelemetryKind, identity: &DeviceIdentity) -> Option<LatestRecord> {
        self.inner.borrow().latest.get(&(kind, identity.clone())).cloned()
    }

    /// 保存最新快照，然后按注册顺序同步调用所有匹配的订阅者。
    ///
    /// 单个回调返回错误或 panic 只记录日志，不影响其他订阅者。不做去重。
    pub fn publish(&self, record: TelemetryRecord) {
        let kind = record.kind();
        let callbacks: Vec<(SubscriptionId, RecordCallback)> = {
            let mut inner = self.inner.borrow_mut();
            inner.latest.insert(
                (kind, record.identity().clone()),
                LatestRecord { record: record.clone(), received_at: Utc::now() },
            );
            inner
                .record_subscribers
                .iter()
                .filter(|sub| sub.matches(&record))
                .map(|sub| (sub.id, sub.callback.clone()))
                .collect()
        };

        for (id, callback) in callbacks {
            invoke_isolated(id, &callback, &record);
        }
    }

    /// 把通道事件分发给所有生命周期订阅者。
    pub fn emit(&self, event: &ChannelEvent) {
        let callbacks: Vec<(SubscriptionId, EventCallback)> = self
            .inner
            .borrow()
            .event_subscribers
            .iter()
            .map(|sub| (sub.id, sub.callback.clone()))
            .collect();

        for (id, callback) in callbacks {
            invoke_isolated(id, &callback, event);
        }
    }
}

fn invoke_isolated<T: ?Sized + std::fmt::Debug>(
    id: SubscriptionId,
    callback: &Rc<RefCell<dyn FnMut(&T) -> anyhow::Result<()>>>,
    value: &T,
) {
    // 回调在分发过程中再次触发自身时跳过，避免重复借用
    let Ok(mut callback) = callback.try_borrow_mut() else {
        warn!("[VeloClient] 订阅者 {} 正在执行中，跳过重入分发: {:?}", id, value);
        return;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| (&mut *callback)(value))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("[VeloClient] 订阅者 {} 处理失败: {:#}", id, e),
        Err(_) => error!("[VeloClient] 订阅者 {} 在处理 {:?} 时 panic，已隔离", id, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;
    use std::cell::Cell;
    use velo_models::decode;

    fn status_record(imei: &str, speed: f64) -> TelemetryRecord {
        decode(
            TelemetryKind::Status,
            &json!({ "imei": imei, "veloId": "v1", "statusData": { "speed": speed } }),
        )
        .expect("测试记录应解码成功")
    }

    fn identity(imei: &str) -> DeviceIdentity {
        DeviceIdentity::new(imei, "v1").expect("测试身份应合法")
    }

    #[test]
    fn test_publish_twice_delivers_twice_and_keeps_latest() {
        let registry = SubscriberRegistry::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        registry.subscribe(TelemetryKind::Status, None, move |record| {
            sink.borrow_mut().push(record.clone());
            Ok(())
        });

        let record = status_record("123", 42.0);
        registry.publish(record.clone());
        registry.publish(record.clone());

        assert_eq!(*received.borrow(), vec![record.clone(), record.clone()], "相同记录应被分发两次，不做去重");
        let latest = registry.latest(TelemetryKind::Status, &identity("123")).expect("应保存最新快照");
        assert_eq!(latest.record, record);
        assert!(registry.latest(TelemetryKind::Gps, &identity("123")).is_none());
    }

    #[test]
    fn test_latest_is_overwritten_by_newer_record() {
        let registry = SubscriberRegistry::new();
        registry.publish(status_record("123", 1.0));
        registry.publish(status_record("123", 2.0));
        registry.publish(status_record("456", 9.0));

        let latest = registry.latest(TelemetryKind::Status, &identity("123")).expect("应保存最新快照");
        assert_eq!(latest.record, status_record("123", 2.0));
    }

    #[test]
    fn test_filters_by_kind_and_identity_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        registry.subscribe(TelemetryKind::Status, Some(identity("123")), move |_| {
            l.borrow_mut().push("filtered");
            Ok(())
        });
        let l = log.clone();
        registry.subscribe(TelemetryKind::Status, None, move |_| {
            l.borrow_mut().push("all");
            Ok(())
        });
        let l = log.clone();
        registry.subscribe(TelemetryKind::Gps, None, move |_| {
            l.borrow_mut().push("gps");
            Ok(())
        });

        registry.publish(status_record("123", 1.0));
        registry.publish(status_record("456", 1.0));
        assert_eq!(*log.borrow(), vec!["filtered", "all", "all"]);
    }

    #[test]
    fn test_failing_and_panicking_callbacks_are_isolated() {
        let registry = SubscriberRegistry::new();
        let delivered = Rc::new(Cell::new(0));

        registry.subscribe(TelemetryKind::Status, None, |_| Err(anyhow!("界面组件已卸载")));
        registry.subscribe(TelemetryKind::Status, None, |_| panic!("回调内部错误"));
        let d = delivered.clone();
        registry.subscribe(TelemetryKind::Status, None, move |_| {
            d.set(d.get() + 1);
            Ok(())
        });

        registry.publish(status_record("123", 1.0));
        registry.publish(status_record("123", 2.0));
        assert_eq!(delivered.get(), 2, "其他订阅者的失败不应影响后续订阅者");
    }

    #[test]
    fn test_reentrant_subscribe_applies_to_next_publish() {
        let registry = SubscriberRegistry::new();
        let late_calls = Rc::new(Cell::new(0));

        let handle = registry.clone();
        let counter = late_calls.clone();
        let subscribed = Cell::new(false);
        registry.subscribe(TelemetryKind::Status, None, move |_| {
            if !subscribed.replace(true) {
                let counter = counter.clone();
                handle.subscribe(TelemetryKind::Status, None, move |_| {
                    counter.set(counter.get() + 1);
                    Ok(())
                });
            }
            Ok(())
        });

        registry.publish(status_record("123", 1.0));
        assert_eq!(late_calls.get(), 0, "回调中新增的订阅不应收到当前这次分发");
        registry.publish(status_record("123", 2.0));
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_unsubscribe_and_channel_events() {
        let registry = SubscriberRegistry::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let event_id = registry.on_channel_event(move |event| {
            e.borrow_mut().push(event.clone());
            Ok(())
        });
        let record_id = registry.subscribe(TelemetryKind::Status, None, |_| panic!("已退订的回调不应被调用"));

        assert!(registry.unsubscribe(record_id));
        assert!(!registry.unsubscribe(record_id), "重复退订应返回 false");
        registry.publish(status_record("123", 1.0));

        registry.emit(&ChannelEvent::Connected);
        assert!(registry.unsubscribe(event_id));
        registry.emit(&ChannelEvent::Connected);
        assert_eq!(*events.borrow(), vec![ChannelEvent::Connected]);
    }
}
