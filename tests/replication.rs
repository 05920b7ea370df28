mod common;

use common::{FakeLink, bp_key, cuff};
use vitals_relay::{
    catalog::DeviceCatalog,
    session::{ConnectionStatus, Dispatch, RoomId, SessionBinding},
    transport::{MemoryChannel, PeerChannelTransport, RelayTransport},
};

type Transport = PeerChannelTransport<MemoryChannel>;

#[tokio::test]
async fn test_observer_replicates_measuring_history() {
    let (measuring_end, observing_end) = Transport::memory_pair();
    let room = RoomId::new("ward-7");

    let mut observer = SessionBinding::<Transport>::new(DeviceCatalog::builtin());
    observer
        .bind_observing(room.clone(), observing_end)
        .await
        .unwrap();

    let link = FakeLink::default();
    let mut measurer = SessionBinding::<Transport, FakeLink>::new(DeviceCatalog::builtin());
    measurer
        .bind_measuring(room, link.clone(), measuring_end)
        .await
        .unwrap();
    assert_eq!(measurer.status(), ConnectionStatus::Connected);

    for (systolic, diastolic) in [(120, 80), (118, 79), (125, 82)] {
        link.notify(cuff(systolic, diastolic));
    }
    assert_eq!(measurer.pump(), 3);
    assert_eq!(observer.pump(), 3);

    let local = measurer.local().unwrap().history(&bp_key());
    let remote = observer.remote().unwrap().history(&bp_key());
    assert_eq!(local.len(), 3);
    assert_eq!(local, remote);
    assert_eq!(
        observer.remote().unwrap().latest(&bp_key()),
        measurer.local().unwrap().latest(&bp_key())
    );
    assert_eq!(
        remote[0].field("systolic").unwrap().as_number(),
        Some(120.0)
    );

    // Notifications name the service by its short form; reads accept it too.
    assert_eq!(measurer.local().unwrap().history("1810").len(), 3);
    assert_eq!(observer.remote().unwrap().history("1810"), local);
    assert_eq!(
        observer.remote().unwrap().latest("0x1810").unwrap().field("systolic").unwrap().as_number(),
        Some(125.0)
    );
}

#[tokio::test]
async fn test_closed_channel_drops_forwarded_records() {
    let (measuring_end, observing_end) = Transport::memory_pair();
    let room = RoomId::new("ward-7");

    let mut observer = SessionBinding::<Transport>::new(DeviceCatalog::builtin());
    observer
        .bind_observing(room.clone(), observing_end)
        .await
        .unwrap();

    let link = FakeLink::default();
    let mut measurer = SessionBinding::<Transport, FakeLink>::new(DeviceCatalog::builtin());
    measurer
        .bind_measuring(room, link.clone(), measuring_end)
        .await
        .unwrap();

    measurer.transport().unwrap().channel().set_open(false);
    link.notify(cuff(120, 80));

    assert_eq!(measurer.pump(), 1);
    assert_eq!(observer.pump(), 0);
    assert_eq!(measurer.local().unwrap().history(&bp_key()).len(), 1);
    assert!(observer.remote().unwrap().store().is_empty());
    assert!(!measurer.transport().unwrap().is_open());
}

#[tokio::test]
async fn test_rebinding_drops_notifications_from_previous_room() {
    let (first_end, _first_peer) = Transport::memory_pair();
    let (second_end, _second_peer) = Transport::memory_pair();

    let old_link = FakeLink::default();
    let mut measurer = SessionBinding::<Transport, FakeLink>::new(DeviceCatalog::builtin());
    measurer
        .bind_measuring(RoomId::new("ward-7"), old_link.clone(), first_end)
        .await
        .unwrap();

    // Delivered before the rebind but dispatched after it.
    old_link.notify(cuff(120, 80));

    let new_link = FakeLink::default();
    measurer
        .bind_measuring(RoomId::new("ward-8"), new_link.clone(), second_end)
        .await
        .unwrap();

    old_link.notify(cuff(130, 85));
    new_link.notify(cuff(110, 70));

    let mut dispatched = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), measurer.next_event()).await
    {
        dispatched.push(measurer.dispatch(event));
    }

    assert_eq!(
        dispatched,
        vec![
            Dispatch::Dropped,
            Dispatch::Dropped,
            Dispatch::Appended { service_key: bp_key() },
        ]
    );

    let history = measurer.local().unwrap().history(&bp_key());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].field("systolic").unwrap().as_number(), Some(110.0));
    assert_eq!(measurer.state().unwrap().room_id, RoomId::new("ward-8"));
}
