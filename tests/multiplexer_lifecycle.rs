//! Жизненный цикл подписок и машина состояний соединения мультиплексора.

use std::{sync::Arc, thread};

use parking_lot::Mutex;
use zumic_mpx::{
    ChannelSubscription, ConnectionEvent, ConnectionState, Handlers, Multiplexer, PubSubCommand,
    Settings, StackError, SubscriptionError,
};

mod common;
use common::*;

fn sorted(mut commands: Vec<PubSubCommand>) -> Vec<PubSubCommand> {
    commands.sort_by_key(|c| format!("{c:?}"));
    commands
}

/// Сценарий "news": A подписывается, брокер подтверждает, приходит
/// сообщение; B присоединяется к активному каналу и сразу получает
/// активацию; отписка A не трогает B, отписка B снимает канал.
#[test]
fn test_news_scenario() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();

    let a = mux.create_channel_subscription(journal.handlers("A")).unwrap();
    a.add("news").unwrap();
    assert_eq!(link.take(), vec![subscribe(&["news"])]);

    mux.handle_event(ConnectionEvent::Subscribed("news".into()));
    mux.handle_event(message("news", "hello"));
    assert_eq!(
        journal.take(),
        vec!["A:activation:news", "A:message:news:hello"]
    );

    let b = mux.create_channel_subscription(journal.handlers("B")).unwrap();
    b.add("news").unwrap();
    assert_eq!(journal.take(), vec!["B:activation:news"]);
    assert!(link.take().is_empty(), "no second physical subscribe");

    a.remove("news").unwrap();
    assert!(link.take().is_empty());
    assert!(mux.is_channel_active("news"));
    assert_eq!(mux.channel_listeners("news"), 1);

    b.remove("news").unwrap();
    assert_eq!(link.take(), vec![unsubscribe(&["news"])]);
    assert!(!mux.is_channel_active("news"));
    assert!(mux.channels().is_empty());
}

/// Физическая подписка уходит ровно один раз на время жизни ключа.
#[test]
fn test_physical_subscribe_exactly_once() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();

    let subs: Vec<_> = (0..5)
        .map(|_| mux.create_channel_subscription(journal.handlers("s")).unwrap())
        .collect();
    for sub in &subs {
        sub.add("hot").unwrap();
        sub.add("hot").unwrap();
    }
    assert_eq!(link.take(), vec![subscribe(&["hot"])]);
    assert_eq!(mux.channel_listeners("hot"), 5);

    for sub in &subs[..4] {
        sub.remove("hot").unwrap();
        sub.remove("hot").unwrap();
    }
    assert!(link.take().is_empty());

    subs[4].remove("hot").unwrap();
    assert_eq!(link.take(), vec![unsubscribe(&["hot"])]);

    subs[0].add("hot").unwrap();
    assert_eq!(link.take(), vec![subscribe(&["hot"])]);
}

/// Закрытие подписки снимает все её каналы и отписывает только осиротевшие.
#[test]
fn test_close_unwinds_all_channels() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();

    let owner = mux.create_channel_subscription(journal.handlers("o")).unwrap();
    let other = mux.create_channel_subscription(journal.handlers("x")).unwrap();
    for channel in ["c1", "c2", "c3"] {
        owner.add(channel).unwrap();
    }
    other.add("c2").unwrap();
    link.take();

    owner.close().unwrap();
    assert_eq!(
        sorted(link.take()),
        vec![unsubscribe(&["c1"]), unsubscribe(&["c3"])]
    );
    assert_eq!(mux.channels(), vec!["c2".to_string()]);
    assert!(owner.is_closed());
    assert!(owner.channels().is_empty());
}

/// `clear` снимает каналы, но подписка остаётся рабочей.
#[test]
fn test_clear_keeps_subscription_open() {
    let (mux, link) = connected_mux();
    let sub = mux
        .create_channel_subscription(Journal::default().handlers("s"))
        .unwrap();
    sub.add("a").unwrap();
    sub.add("b").unwrap();
    link.take();

    sub.clear().unwrap();
    assert_eq!(
        sorted(link.take()),
        vec![unsubscribe(&["a"]), unsubscribe(&["b"])]
    );
    assert!(!sub.is_closed());

    sub.add("a").unwrap();
    assert_eq!(sub.channels(), vec!["a".to_string()]);
}

/// Повторные сигналы `Reconnecting` за один обрыв вызывают disconnect
/// ровно один раз.
#[test]
fn test_reconnecting_is_deduplicated() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();

    let a = mux.create_channel_subscription(journal.handlers("A")).unwrap();
    let p = mux.create_pattern_subscription("log.*", journal.handlers("P")).unwrap();
    a.add("news").unwrap();
    mux.handle_event(ConnectionEvent::Subscribed("news".into()));
    mux.handle_event(ConnectionEvent::PSubscribed("log.*".into()));
    journal.take();
    link.take();

    for _ in 0..3 {
        mux.handle_event(ConnectionEvent::Reconnecting);
    }
    // Узлы в порядке реестра: сначала самый новый (P).
    assert_eq!(journal.take(), vec!["P:disconnect", "A:disconnect"]);
    assert_eq!(mux.connection_state(), ConnectionState::Reconnecting);
    assert!(!mux.is_channel_active("news"));
    assert!(!mux.is_pattern_active("log.*"));

    mux.handle_event(ConnectionEvent::Connected);
    assert_eq!(
        link.take(),
        vec![subscribe(&["news"]), psubscribe(&["log.*"])]
    );

    mux.handle_event(ConnectionEvent::Reconnecting);
    mux.handle_event(ConnectionEvent::Reconnecting);
    assert_eq!(journal.take(), vec!["P:disconnect", "A:disconnect"]);

    drop(p);
}

/// `Reconnecting` до первого подключения ничего не делает.
#[test]
fn test_reconnecting_before_connect_is_noop() {
    let link = RecordingLink::default();
    let mux = Multiplexer::new(Arc::new(link.clone()));
    let journal = Journal::default();
    let _sub = mux.create_channel_subscription(journal.handlers("A")).unwrap();

    mux.handle_event(ConnectionEvent::Reconnecting);
    assert!(journal.take().is_empty());
    assert_eq!(mux.connection_state(), ConnectionState::Disconnected);
}

/// Подключение заново подписывается на все ключи одним пакетом.
#[test]
fn test_connect_resubscribes_everything() {
    let link = RecordingLink::default();
    let mux = Multiplexer::new(Arc::new(link.clone()));
    let journal = Journal::default();

    let sub = mux.create_channel_subscription(journal.handlers("c")).unwrap();
    sub.add("a").unwrap();
    sub.add("b").unwrap();
    let _p = mux.create_pattern_subscription("x*", journal.handlers("p")).unwrap();
    link.take();

    mux.handle_event(ConnectionEvent::Connected);
    let commands = link.take();
    assert_eq!(commands.len(), 2);
    match &commands[0] {
        PubSubCommand::Subscribe(keys) => {
            let mut keys = keys.clone();
            keys.sort();
            assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("unexpected command {other:?}"),
    }
    assert_eq!(commands[1], psubscribe(&["x*"]));
}

/// Подключение без подписок не шлёт пустых команд.
#[test]
fn test_connect_without_keys_sends_nothing() {
    let (_mux, link) = connected_mux();
    assert!(link.take().is_empty());
}

/// После обрыва поздний подписчик не активируется, пока брокер не
/// подтвердит ключ заново.
#[test]
fn test_no_synchronous_activation_after_outage() {
    let (mux, _link) = connected_mux();
    let journal = Journal::default();

    let a = mux.create_channel_subscription(journal.handlers("A")).unwrap();
    a.add("news").unwrap();
    mux.handle_event(ConnectionEvent::Subscribed("news".into()));
    mux.handle_event(ConnectionEvent::Reconnecting);
    journal.take();

    let b = mux.create_channel_subscription(journal.handlers("B")).unwrap();
    b.add("news").unwrap();
    assert!(journal.take().is_empty());

    mux.handle_event(ConnectionEvent::Connected);
    mux.handle_event(ConnectionEvent::Subscribed("news".into()));
    assert_eq!(
        journal.take(),
        vec!["B:activation:news", "A:activation:news"]
    );
}

/// `PMessage` идёт по реестру шаблона, но обработчик получает литеральный
/// канал.
#[test]
fn test_pmessage_passes_literal_channel() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();

    let p = mux.create_pattern_subscription("req:*", journal.handlers("P")).unwrap();
    assert_eq!(link.take(), vec![psubscribe(&["req:*"])]);
    assert_eq!(p.pattern(), "req:*");

    mux.handle_event(pmessage("req:*", "req:42", "ok"));
    mux.handle_event(pmessage("other:*", "other:1", "no"));
    assert_eq!(journal.take(), vec!["P:message:req:42:ok"]);

    p.close().unwrap();
    assert_eq!(link.take(), vec![punsubscribe(&["req:*"])]);
    assert!(p.close().unwrap_err().is_closed());
}

/// Поздний подписчик на активный шаблон активируется синхронно.
#[test]
fn test_pattern_late_joiner_activation() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();

    let _first = mux.create_pattern_subscription("a.*", journal.handlers("1")).unwrap();
    mux.handle_event(ConnectionEvent::PSubscribed("a.*".into()));
    journal.take();
    link.take();

    let _second = mux.create_pattern_subscription("a.*", journal.handlers("2")).unwrap();
    assert_eq!(journal.take(), vec!["2:activation:a.*"]);
    assert!(link.take().is_empty());
    assert_eq!(mux.pattern_listeners("a.*"), 2);
}

/// Сообщения и активации идут в порядке реестра: новые первыми.
#[test]
fn test_dispatch_order_newest_first() {
    let (mux, _link) = connected_mux();
    let journal = Journal::default();

    let subs: Vec<_> = ["1", "2", "3"]
        .into_iter()
        .map(|tag| {
            let sub = mux.create_channel_subscription(journal.handlers(tag)).unwrap();
            sub.add("news").unwrap();
            sub
        })
        .collect();

    mux.handle_event(message("news", "m"));
    assert_eq!(
        journal.take(),
        vec!["3:message:news:m", "2:message:news:m", "1:message:news:m"]
    );
    drop(subs);
}

/// Обработчик, снимающий ещё не обойдённый узел: снятый узел не
/// вызывается, а канал остаётся подписан.
#[test]
fn test_callback_removes_pending_listener() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();
    let victim: Arc<Mutex<Option<Arc<ChannelSubscription>>>> = Arc::default();

    let a = Arc::new(mux.create_channel_subscription(journal.handlers("A")).unwrap());
    a.add("news").unwrap();
    *victim.lock() = Some(a.clone());

    let slot = victim.clone();
    let b_journal = journal.clone();
    let b = mux
        .create_channel_subscription(Handlers::new(move |channel, _| {
            b_journal.push(format!("B:message:{channel}"));
            if let Some(a) = slot.lock().take() {
                a.remove(channel).unwrap();
            }
        }))
        .unwrap();
    b.add("news").unwrap();
    link.take();

    mux.handle_event(message("news", "x"));
    assert_eq!(journal.take(), vec!["B:message:news"]);
    assert!(link.take().is_empty());
    assert_eq!(mux.channel_listeners("news"), 1);
}

/// Обработчик может закрыть собственную подписку во время доставки.
#[test]
fn test_callback_closes_own_subscription() {
    let (mux, link) = connected_mux();
    let slot: Arc<Mutex<Option<Arc<ChannelSubscription>>>> = Arc::default();
    let hits = Arc::new(Mutex::new(0));

    let inner_slot = slot.clone();
    let inner_hits = hits.clone();
    let sub = Arc::new(
        mux.create_channel_subscription(Handlers::new(move |_, _| {
            *inner_hits.lock() += 1;
            if let Some(me) = inner_slot.lock().take() {
                me.close().unwrap();
            }
        }))
        .unwrap(),
    );
    sub.add("once").unwrap();
    *slot.lock() = Some(sub.clone());
    link.take();

    mux.handle_event(message("once", "1"));
    mux.handle_event(message("once", "2"));
    assert_eq!(*hits.lock(), 1);
    assert_eq!(link.take(), vec![unsubscribe(&["once"])]);
    assert!(sub.is_closed());
}

/// Любая операция после закрытия и повторное закрытие дают ошибку.
#[test]
fn test_use_after_close_fails() {
    let (mux, _link) = connected_mux();
    let sub = mux
        .create_channel_subscription(Journal::default().handlers("s"))
        .unwrap();
    sub.close().unwrap();

    let errors = [
        sub.add("a").unwrap_err(),
        sub.remove("a").unwrap_err(),
        sub.clear().unwrap_err(),
        sub.close().unwrap_err(),
    ];
    for err in errors {
        assert_eq!(
            err,
            SubscriptionError::Closed {
                entity: "channel subscription"
            }
        );
    }
}

/// Закрытие мультиплексора шлёт `QUIT` и запрещает создание подписок.
#[test]
fn test_multiplexer_close() {
    let (mux, link) = connected_mux();
    mux.close().unwrap();
    assert_eq!(link.take(), vec![PubSubCommand::Quit]);
    assert!(mux.is_closed());

    let handlers = Journal::default().handlers("s");
    assert!(mux
        .create_channel_subscription(handlers.clone())
        .unwrap_err()
        .is_closed());
    assert!(mux
        .create_pattern_subscription("p*", handlers)
        .unwrap_err()
        .is_closed());
    assert!(mux
        .create_rendezvous_subscription("req:")
        .unwrap_err()
        .is_closed());

    let err: StackError = mux.close().unwrap_err().into();
    assert_eq!(err.status_code(), zumic_mpx::error::StatusCode::SubscriptionClosed);
}

/// Удаление незакрытой подписки снимает её регистрации.
#[test]
fn test_drop_unwinds_subscription() {
    let (mux, link) = connected_mux();
    let journal = Journal::default();
    {
        let sub = mux.create_channel_subscription(journal.handlers("s")).unwrap();
        sub.add("tmp").unwrap();
        let _p = mux.create_pattern_subscription("t*", journal.handlers("p")).unwrap();
    }
    assert_eq!(
        sorted(link.take()),
        vec![
            psubscribe(&["t*"]),
            punsubscribe(&["t*"]),
            subscribe(&["tmp"]),
            unsubscribe(&["tmp"]),
        ]
    );

    mux.handle_event(ConnectionEvent::Reconnecting);
    assert!(journal.take().is_empty(), "dropped subscriptions get no disconnect");
}

/// Подтверждение ключа без слушателей игнорируется.
#[test]
fn test_confirmation_for_unknown_key_is_ignored() {
    let (mux, _link) = connected_mux();
    mux.handle_event(ConnectionEvent::Subscribed("ghost".into()));
    mux.handle_event(ConnectionEvent::Unsubscribed("ghost".into()));
    assert!(!mux.is_channel_active("ghost"));
    assert!(mux.channels().is_empty());
}

/// Конкурентные add/remove из нескольких потоков сохраняют строгое
/// чередование SUBSCRIBE/UNSUBSCRIBE.
#[test]
fn test_concurrent_add_remove_alternates() {
    let (mux, link) = connected_mux();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let mux = mux.clone();
            thread::spawn(move || {
                let sub = mux
                    .create_channel_subscription(Handlers::new(|_, _| {}))
                    .unwrap();
                for _ in 0..200 {
                    sub.add("hot").unwrap();
                    mux.handle_event(message("hot", "x"));
                    sub.remove("hot").unwrap();
                }
                sub.close().unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let commands = link.take();
    assert!(!commands.is_empty());
    for (i, command) in commands.iter().enumerate() {
        let expected = if i % 2 == 0 {
            subscribe(&["hot"])
        } else {
            unsubscribe(&["hot"])
        };
        assert_eq!(command, &expected, "command #{i}");
    }
    assert!(mux.channels().is_empty());
}

/// Некорректные настройки отклоняются до запуска соединения.
#[tokio::test]
async fn test_connect_rejects_invalid_settings() {
    let settings = Settings {
        backoff_base_ms: 1_000,
        backoff_max_ms: 10,
        ..Settings::default()
    };

    let err = Multiplexer::connect(&settings).unwrap_err();
    assert_eq!(
        err.status_code(),
        zumic_mpx::error::StatusCode::InvalidConfig
    );
    assert_eq!(err.contexts()[0].message, "Invalid multiplexer settings");
    assert!(!err.is_retryable());
}
