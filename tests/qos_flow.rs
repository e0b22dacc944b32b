use bytes::BytesMut;
use mqtt_protocol_engine::packet::connect::ConnectPacket;
use mqtt_protocol_engine::packet::puback::PubAckPacket;
use mqtt_protocol_engine::packet::pubrec::PubRecPacket;
use mqtt_protocol_engine::session::{InboundDecision, ReceiveQuota};
use mqtt_protocol_engine::storage::{FlowRecord, FlowStore};
use mqtt_protocol_engine::testing::{self, FailingFlowStore, RecordingSink, RecordingTerminator};
use mqtt_protocol_engine::{
    ConnectionState, DecodeOutcome, EngineConfig, MemoryFlowStore, MqttDecoder, OutboundPacket,
    Packet, ProtocolVersion, QoS, QosEngine,
};

/// A decoder, an engine and the state of one client connection
struct Connection {
    decoder: MqttDecoder<RecordingTerminator>,
    connection: ConnectionState,
    engine: QosEngine<MemoryFlowStore, RecordingSink>,
    terminator: RecordingTerminator,
    buf: BytesMut,
    forwarded: Vec<u16>,
}

impl Connection {
    fn open(store: &MemoryFlowStore, connect: &ConnectPacket) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("mqtt_protocol_engine=debug")
            .with_test_writer()
            .try_init();

        let config = EngineConfig::default();
        let mut decoder = MqttDecoder::new(config.clone(), RecordingTerminator::default());
        let mut connection = ConnectionState::new();
        let mut buf = BytesMut::from(
            &testing::encode_packet(connect, connect.protocol_version).unwrap()[..],
        );
        assert!(decoder.decode(&mut connection, &mut buf).into_packet().is_some());

        let engine = QosEngine::new(&config, &connection, store.clone(), RecordingSink::default());
        Self {
            decoder,
            connection,
            engine,
            terminator: RecordingTerminator::default(),
            buf,
            forwarded: Vec::new(),
        }
    }

    /// Decodes `bytes` and runs every packet through the engine the way a
    /// connection task would
    async fn receive(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        loop {
            let packet = match self.decoder.decode(&mut self.connection, &mut self.buf) {
                DecodeOutcome::Decoded(packet) => packet,
                DecodeOutcome::NeedMoreData | DecodeOutcome::Rejected(_) => return,
            };
            match packet {
                Packet::Publish(publish) => {
                    let decision = self
                        .engine
                        .on_inbound_publish(&self.connection, &publish, &mut self.terminator)
                        .await;
                    if decision == Ok(InboundDecision::Forward) {
                        self.forwarded.push(publish.packet_id.unwrap_or(0));
                    }
                }
                Packet::PubRel(pubrel) => {
                    self.engine
                        .on_inbound_pubrel(&self.connection, &pubrel)
                        .await
                        .unwrap();
                }
                Packet::PubAck(puback) => {
                    self.engine.on_puback_received(&puback);
                }
                _ => {}
            }
        }
    }
}

fn v5_connect(client_id: &str, session_expiry: u32) -> ConnectPacket {
    ConnectPacket::new(ProtocolVersion::V5, client_id)
        .with_clean_start(false)
        .with_session_expiry_interval(session_expiry)
}

fn qos_publish(qos: QoS, packet_id: u16, dup: bool) -> Vec<u8> {
    testing::publish(ProtocolVersion::V5, "sensors/1", qos, Some(packet_id), dup, b"21.5")
}

#[tokio::test]
async fn test_dup_resend_forwarded_once() {
    let store = MemoryFlowStore::new();
    let mut client = Connection::open(&store, &v5_connect("dedup", 0));

    client.receive(&qos_publish(QoS::AtLeastOnce, 5, false)).await;
    client.receive(&qos_publish(QoS::AtLeastOnce, 5, true)).await;
    client.receive(&qos_publish(QoS::AtLeastOnce, 5, true)).await;

    assert_eq!(client.forwarded, vec![5]);
    assert!(client.terminator.events.is_empty());
}

#[tokio::test]
async fn test_qos2_lifecycle() {
    let store = MemoryFlowStore::new();
    let mut client = Connection::open(&store, &v5_connect("qos2", 0));

    client.receive(&qos_publish(QoS::ExactlyOnce, 7, false)).await;
    assert!(matches!(
        store.get("qos2", 7).await.unwrap(),
        Some(FlowRecord::Publish(_))
    ));

    client
        .engine
        .send_pubrec(&client.connection, PubRecPacket::new(7))
        .await
        .unwrap();
    // resend before the PUBREL is a duplicate
    client.receive(&qos_publish(QoS::ExactlyOnce, 7, true)).await;
    assert_eq!(client.forwarded, vec![7]);

    client.receive(&testing::pubrel(7)).await;
    assert_eq!(store.get("qos2", 7).await.unwrap(), None);

    let written: Vec<_> = client.engine.sink().written.iter().collect();
    assert!(matches!(
        written.as_slice(),
        [OutboundPacket::PubRec(rec), OutboundPacket::PubComp(comp)]
            if rec.packet_id == 7 && comp.packet_id == 7
    ));
}

#[tokio::test]
async fn test_pubrel_survives_reconnect() {
    let store = MemoryFlowStore::new();
    let mut first = Connection::open(&store, &v5_connect("persistent", 3600));
    first.receive(&qos_publish(QoS::ExactlyOnce, 11, false)).await;
    first.engine.on_connection_closed(&first.connection).await;
    assert_eq!(store.flow_count("persistent").await, 1);

    let mut second = Connection::open(&store, &v5_connect("persistent", 3600));
    // the client resends with DUP after reconnecting; nothing was forwarded on
    // this connection yet
    second.receive(&qos_publish(QoS::ExactlyOnce, 11, true)).await;
    assert_eq!(second.forwarded, vec![11]);

    second.receive(&testing::pubrel(11)).await;
    assert_eq!(store.flow_count("persistent").await, 0);
}

#[tokio::test]
async fn test_reused_identifier_without_dup_is_new_flow() {
    let store = MemoryFlowStore::new();
    let mut client = Connection::open(&store, &v5_connect("reuse", 0));

    client.receive(&qos_publish(QoS::AtLeastOnce, 2, false)).await;
    client.receive(&qos_publish(QoS::AtLeastOnce, 2, false)).await;
    assert_eq!(client.forwarded, vec![2, 2]);
}

#[tokio::test]
async fn test_receive_maximum_exceeded_disconnects() {
    let store = MemoryFlowStore::new();
    let mut client = Connection::open(&store, &v5_connect("greedy", 0));

    for id in 1..=10 {
        client.receive(&qos_publish(QoS::AtLeastOnce, id, false)).await;
    }
    assert!(client.terminator.events.is_empty());

    client.receive(&qos_publish(QoS::AtLeastOnce, 11, false)).await;
    assert_eq!(client.forwarded.len(), 10);
    assert_eq!(client.terminator.events.len(), 1);
}

#[tokio::test]
async fn test_v311_client_is_not_bound_by_receive_maximum() {
    let store = MemoryFlowStore::new();
    let connect = ConnectPacket::new(ProtocolVersion::V3_1_1, "legacy").with_clean_start(false);
    let mut client = Connection::open(&store, &connect);
    let limit = EngineConfig::default().server_receive_maximum;

    for id in 1..=limit + 10 {
        let bytes = testing::publish(
            ProtocolVersion::V3_1_1,
            "sensors/1",
            QoS::AtLeastOnce,
            Some(id),
            false,
            b"21.5",
        );
        client.receive(&bytes).await;
    }

    assert_eq!(client.forwarded, (1..=limit + 10).collect::<Vec<_>>());
    assert!(client.terminator.events.is_empty());
    assert_eq!(store.flow_count("legacy").await, usize::from(limit + 10));

    // dedup and record retirement work as on v5
    let resend = testing::publish(
        ProtocolVersion::V3_1_1,
        "sensors/1",
        QoS::AtLeastOnce,
        Some(1),
        true,
        b"21.5",
    );
    client.receive(&resend).await;
    assert_eq!(client.forwarded.len(), usize::from(limit + 10));

    client
        .engine
        .send_puback(&client.connection, PubAckPacket::new(1))
        .await
        .unwrap();
    assert_eq!(store.get("legacy", 1).await.unwrap(), None);
}

#[tokio::test]
async fn test_puback_completes_inbound_flow() {
    let store = MemoryFlowStore::new();
    let mut client = Connection::open(&store, &v5_connect("acker", 0));

    client.receive(&qos_publish(QoS::AtLeastOnce, 3, false)).await;
    client
        .engine
        .send_puback(&client.connection, PubAckPacket::new(3))
        .await
        .unwrap();
    assert_eq!(store.flow_count("acker").await, 0);
    assert_eq!(client.engine.inbound().quota().map(ReceiveQuota::in_use), Some(0));

    // same identifier again opens a fresh flow
    client.receive(&qos_publish(QoS::AtLeastOnce, 3, false)).await;
    assert_eq!(client.forwarded, vec![3, 3]);
}

#[tokio::test]
async fn test_qos0_bypasses_flow_tracking() {
    let store = MemoryFlowStore::new();
    let mut client = Connection::open(&store, &v5_connect("q0", 0));
    let bytes = testing::publish(ProtocolVersion::V5, "a", QoS::AtMostOnce, None, false, b"x");

    for _ in 0..20 {
        client.receive(&bytes).await;
    }
    assert_eq!(client.forwarded.len(), 20);
    assert_eq!(store.flow_count("q0").await, 0);
}

#[tokio::test]
async fn test_failing_store_does_not_stall_connection() {
    let config = EngineConfig::default();
    let mut connection = ConnectionState::new();
    connection
        .accept_connect(&ConnectPacket::new(ProtocolVersion::V5, "flaky"), &config)
        .unwrap();
    let mut engine = QosEngine::new(&config, &connection, FailingFlowStore, RecordingSink::default());
    let mut terminator = RecordingTerminator::default();

    let publish = mqtt_protocol_engine::PublishPacket::new("t", &b"x"[..], QoS::ExactlyOnce)
        .with_packet_id(1);
    let decision = engine
        .on_inbound_publish(&connection, &publish, &mut terminator)
        .await;
    assert_eq!(decision, Ok(InboundDecision::Forward));

    // without a readable record the resend cannot be told from a new flow
    let resend = publish.clone().with_dup(true);
    let decision = engine
        .on_inbound_publish(&connection, &resend, &mut terminator)
        .await;
    assert_eq!(decision, Ok(InboundDecision::Forward));

    engine
        .on_inbound_pubrel(
            &connection,
            &mqtt_protocol_engine::packet::pubrel::PubRelPacket::new(1),
        )
        .await
        .unwrap();
    assert_eq!(engine.inbound().quota().map(ReceiveQuota::in_use), Some(0));
    assert!(terminator.events.is_empty());
}

#[tokio::test]
async fn test_outbound_ack_from_client_releases_queue() {
    let store = MemoryFlowStore::new();
    let mut client = Connection::open(
        &store,
        &v5_connect("subscriber", 0).with_receive_maximum(1),
    );

    let publish = |id| {
        OutboundPacket::Publish(
            mqtt_protocol_engine::PublishPacket::new("out", &b"y"[..], QoS::AtLeastOnce)
                .with_packet_id(id),
        )
    };
    let mut first = client.engine.submit_outbound(publish(1)).handle;
    let second = client.engine.submit_outbound(publish(2));
    assert!(second.queued);

    client.receive(&testing::puback(1)).await;
    assert_eq!(
        first.try_status(),
        mqtt_protocol_engine::DeliveryStatus::Delivered
    );
    assert_eq!(client.engine.sink().written_ids(), vec![1, 2]);
}
