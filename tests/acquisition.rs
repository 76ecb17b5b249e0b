mod common;

use common::{driver, init_tracing, Action, MockTransport};
use ng_driver_s7::{
    protocol::frame::{BytesOptions, StringLayout, StringOptions, TagOptions, ValueKind},
    CollectingSink, ErrorKind, PollGroup, S7Value, TagDescriptor,
};

fn db1_image() -> Vec<u8> {
    let mut mem = vec![0u8; 64];
    mem[0..2].copy_from_slice(&0x1234u16.to_be_bytes());
    mem[2..4].copy_from_slice(&(-7i16).to_be_bytes());
    mem[4] = 0b0000_0100;
    mem[10..14].copy_from_slice(&2.5f32.to_be_bytes());
    mem[20..24].copy_from_slice(b"S7\0\0");
    mem
}

fn mixed_tags() -> Vec<TagDescriptor> {
    vec![
        TagDescriptor::new("speed", "DB1.DBW1", ValueKind::UInt16),
        TagDescriptor::new("offset", "DB1.DBW3", ValueKind::Int16),
        TagDescriptor::new("running", "DB1.DBW5", ValueKind::Bit).with_options(TagOptions {
            bit: Some(2),
            ..Default::default()
        }),
        TagDescriptor::new("level", "DB1.DBW11", ValueKind::Float32),
        TagDescriptor::new("label", "DB1.DBW21", ValueKind::String).with_options(TagOptions {
            string: Some(StringOptions {
                length: 4,
                layout: StringLayout::High,
            }),
            ..Default::default()
        }),
    ]
}

fn blob(name: &str, address: &str) -> TagDescriptor {
    TagDescriptor::new(name, address, ValueKind::Bytes).with_options(TagOptions {
        bytes: Some(BytesOptions { length: 120 }),
        ..Default::default()
    })
}

/// Two tags far enough apart to need two read commands at PDU 240.
fn two_command_setup(script: Vec<Action>) -> (PollGroup, MockTransport) {
    let group = PollGroup::new("blobs", &[blob("a", "DB1.DBW1"), blob("b", "DB2.DBW1")]);
    let transport = MockTransport::new(240)
        .with_db(1, vec![0x11; 128])
        .with_db(2, vec![0x22; 128])
        .with_script(script);
    (group, transport)
}

#[tokio::test(start_paused = true)]
async fn test_collect_decodes_every_point() {
    init_tracing();
    let mut driver = driver(MockTransport::new(480).with_db(1, db1_image()));
    let mut group = PollGroup::new("line1", &mixed_tags());
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(stats.good, 5);
    assert_eq!(stats.bad, 0);
    assert_eq!(stats.requests, 1);
    assert!(!stats.aborted);
    assert_eq!(sink.last("speed"), Some(&Ok(S7Value::UInt16(0x1234))));
    assert_eq!(sink.last("offset"), Some(&Ok(S7Value::Int16(-7))));
    assert_eq!(sink.last("running"), Some(&Ok(S7Value::Bool(true))));
    assert_eq!(sink.last("level"), Some(&Ok(S7Value::Float32(2.5))));
    assert_eq!(sink.last("label"), Some(&Ok(S7Value::String("S7".into()))));

    let transport = driver.session().transport();
    let jobs = transport.data_jobs();
    assert_eq!(jobs.len(), 1);
    // [0,5) merged, [10,14) and [20,24) separate
    assert_eq!(jobs[0].param[1], 3);
    assert_eq!(driver.session().negotiated_pdu_size(), Some(480));
}

#[tokio::test(start_paused = true)]
async fn test_item_device_error_hits_only_its_points() {
    init_tracing();
    let transport = MockTransport::new(480)
        .with_db(1, db1_image())
        .with_script([Action::FailItems(vec![1], 0x0A)]);
    let mut driver = driver(transport);
    let mut group = PollGroup::new("line1", &mixed_tags());
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(sink.last("level"), Some(&Err(ErrorKind::DeviceError)));
    assert_eq!(sink.last("speed"), Some(&Ok(S7Value::UInt16(0x1234))));
    assert_eq!(sink.last("label"), Some(&Ok(S7Value::String("S7".into()))));
    assert_eq!((stats.good, stats.bad), (4, 1));
    // device errors are not retried
    assert_eq!(driver.session().transport().data_jobs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_response_exhausts_retries_then_moves_on() {
    init_tracing();
    let (mut group, transport) =
        two_command_setup(vec![Action::Silent, Action::Silent, Action::Silent]);
    let mut driver = driver(transport);
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(sink.last("a"), Some(&Err(ErrorKind::NoResponse)));
    assert_eq!(sink.last("b"), Some(&Ok(S7Value::Bytes(vec![0x22; 120]))));
    // first command sent 1 + 2 retries, second once
    assert_eq!(stats.requests, 4);
    assert_eq!(driver.session().transport().data_jobs().len(), 4);
    assert!(!stats.aborted);
    assert!(driver.session().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_single_timeout_recovers_on_retry() {
    init_tracing();
    let (mut group, transport) = two_command_setup(vec![Action::Silent]);
    let mut driver = driver(transport);
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(sink.last("a"), Some(&Ok(S7Value::Bytes(vec![0x11; 120]))));
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.good, 2);
}

#[tokio::test(start_paused = true)]
async fn test_decode_failure_is_scoped_to_command() {
    init_tracing();
    let (mut group, transport) = two_command_setup(vec![Action::Malformed]);
    let mut driver = driver(transport);
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(sink.last("a"), Some(&Err(ErrorKind::ProtocolDecodeFailure)));
    assert_eq!(sink.last("b"), Some(&Ok(S7Value::Bytes(vec![0x22; 120]))));
    assert_eq!(stats.requests, 2);
}

#[tokio::test(start_paused = true)]
async fn test_header_error_fails_whole_command() {
    init_tracing();
    let (mut group, transport) = two_command_setup(vec![Action::HeaderError(0x85, 0x00)]);
    let mut driver = driver(transport);
    let mut sink = CollectingSink::default();

    driver.collect(&mut group, &mut sink).await;

    assert_eq!(sink.last("a"), Some(&Err(ErrorKind::DeviceError)));
    assert_eq!(sink.last("b"), Some(&Ok(S7Value::Bytes(vec![0x22; 120]))));
    assert_eq!(driver.session().transport().data_jobs().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_aborts_cycle_and_next_cycle_reconnects() {
    init_tracing();
    let (mut group, transport) = two_command_setup(vec![Action::Hangup]);
    let mut driver = driver(transport);
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert!(stats.aborted);
    assert_eq!(sink.last("a"), Some(&Err(ErrorKind::Disconnected)));
    assert_eq!(sink.last("b"), Some(&Err(ErrorKind::Disconnected)));
    assert_eq!(driver.session().transport().data_jobs().len(), 1);
    assert!(!driver.session().is_active());

    sink.clear();
    let stats = driver.collect(&mut group, &mut sink).await;

    assert!(!stats.aborted);
    assert_eq!(stats.good, 2);
    let transport = driver.session().transport();
    assert_eq!(transport.reconnects, 1);
    assert_eq!(transport.connects, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_reply_is_dropped() {
    init_tracing();
    let transport = MockTransport::new(480)
        .with_db(1, db1_image())
        .with_script([Action::Stale]);
    let mut driver = driver(transport);
    let mut group = PollGroup::new("line1", &mixed_tags());
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(stats.good, 5);
    assert_eq!(stats.requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_stale_reply_is_dropped() {
    init_tracing();
    let transport = MockTransport::new(480)
        .with_db(1, db1_image())
        .with_script([Action::StaleMalformed]);
    let mut driver = driver(transport);
    let mut group = PollGroup::new("line1", &mixed_tags());
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(stats.good, 5);
    assert_eq!(stats.requests, 1);
    assert_eq!(sink.last("speed"), Some(&Ok(S7Value::UInt16(0x1234))));
}

#[tokio::test(start_paused = true)]
async fn test_unattributable_frame_fails_command() {
    init_tracing();
    let (mut group, transport) = two_command_setup(vec![Action::Garbage]);
    let mut driver = driver(transport);
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(sink.last("a"), Some(&Err(ErrorKind::ProtocolDecodeFailure)));
    assert_eq!(sink.last("b"), Some(&Ok(S7Value::Bytes(vec![0x22; 120]))));
    assert!(!stats.aborted);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_tags_reported_every_cycle() {
    init_tracing();
    let mut tags = mixed_tags();
    tags.push(TagDescriptor::new("zero", "DB1.DBW0", ValueKind::UInt16));
    tags.push(TagDescriptor::new("odd", "DB1.DBW1", ValueKind::Unsupported));
    let mut group = PollGroup::new("line1", &tags);
    assert_eq!(group.rejected().len(), 2);

    let mut driver = driver(MockTransport::new(480).with_db(1, db1_image()));
    let mut sink = CollectingSink::default();
    for _ in 0..2 {
        sink.clear();
        let stats = driver.collect(&mut group, &mut sink).await;
        assert_eq!((stats.good, stats.bad), (5, 2));
        assert_eq!(
            sink.last("zero"),
            Some(&Err(ErrorKind::InvalidAddressFormat))
        );
        assert_eq!(sink.last("odd"), Some(&Err(ErrorKind::UnsupportedType)));
    }
    // the plan is cached, one read per cycle and a single handshake
    assert_eq!(driver.session().transport().data_jobs().len(), 2);
    assert_eq!(driver.session().transport().connects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout_reported_to_all_points() {
    init_tracing();
    let mut transport = MockTransport::new(480).with_db(1, db1_image());
    transport.refuse_connect = true;
    let mut driver = driver(transport);
    let mut group = PollGroup::new("line1", &mixed_tags());
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert!(stats.aborted);
    assert_eq!(stats.bad, 5);
    assert!(sink
        .updates
        .iter()
        .all(|(_, _, v)| *v == Err(ErrorKind::HandshakeTimeout)));
    // the connect request is re-sent after each read timeout
    assert!(driver.session().transport().connects > 1);
    assert!(driver.session().transport().data_jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_small_pdu_splits_commands() {
    init_tracing();
    let tags: Vec<TagDescriptor> = (0..4)
        .map(|i| blob(&format!("b{i}"), &format!("DB{}.DBW1", i + 1)))
        .collect();
    let mut transport = MockTransport::new(240);
    for db in 1..=4 {
        transport = transport.with_db(db, vec![db as u8; 128]);
    }
    let mut driver = driver(transport);
    let mut group = PollGroup::new("big", &tags);
    let mut sink = CollectingSink::default();

    let stats = driver.collect(&mut group, &mut sink).await;

    assert_eq!(stats.good, 4);
    assert_eq!(stats.requests, 4);
    assert_eq!(sink.last("b3"), Some(&Ok(S7Value::Bytes(vec![4; 120]))));
}
