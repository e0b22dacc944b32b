use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mqtt_protocol_engine::session::OutboundWindow;
use mqtt_protocol_engine::testing::{self, RecordingSink, RecordingTerminator};
use mqtt_protocol_engine::*;
use std::hint::black_box;
use std::time::Duration;

fn connected(version: ProtocolVersion) -> (MqttDecoder<RecordingTerminator>, ConnectionState) {
    let mut decoder = MqttDecoder::new(EngineConfig::default(), RecordingTerminator::default());
    let mut connection = ConnectionState::new();
    let connect = match version {
        ProtocolVersion::V5 => testing::connect_v5("bench-client"),
        _ => testing::connect_v311("bench-client"),
    };
    let mut buf = BytesMut::from(&connect[..]);
    decoder.decode(&mut connection, &mut buf).into_packet().unwrap();
    (decoder, connection)
}

fn benchmark_publish_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_decoding");

    for version in [ProtocolVersion::V3_1_1, ProtocolVersion::V5] {
        for size in [64usize, 1024, 16384] {
            let bytes = testing::publish(
                version,
                "bench/topic/decoding",
                QoS::AtLeastOnce,
                Some(1),
                false,
                &vec![0xAB; size],
            );
            group.throughput(Throughput::Bytes(bytes.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{version:?}"), size),
                &bytes,
                |b, bytes| {
                    let (mut decoder, mut connection) = connected(version);
                    b.iter(|| {
                        let mut buf = BytesMut::from(&bytes[..]);
                        black_box(decoder.decode(&mut connection, &mut buf));
                    });
                },
            );
        }
    }

    group.finish();
}

fn benchmark_fragmented_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_stream");

    let mut stream = Vec::new();
    for id in 1..=100u16 {
        stream.extend(testing::publish(
            ProtocolVersion::V5,
            "bench/stream",
            QoS::AtLeastOnce,
            Some(id),
            false,
            &[0u8; 128],
        ));
    }
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk in [16usize, 512, 8192] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let (mut decoder, mut connection) = connected(ProtocolVersion::V5);
                let mut buf = BytesMut::new();
                let mut decoded = 0;
                for piece in stream.chunks(chunk) {
                    buf.extend_from_slice(piece);
                    while let DecodeOutcome::Decoded(packet) = decoder.decode(&mut connection, &mut buf) {
                        black_box(packet);
                        decoded += 1;
                    }
                }
                assert_eq!(decoded, 100);
            });
        });
    }

    group.finish();
}

fn benchmark_outbound_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_window");

    for capacity in [1u16, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("submit_complete", capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let mut sink = RecordingSink::default();
                    let mut window = OutboundWindow::new(capacity, &EngineConfig::default());
                    for id in 1..=200u16 {
                        let publish = PublishPacket::new("bench/out", &b"payload"[..], QoS::AtLeastOnce)
                            .with_packet_id(id);
                        black_box(window.submit(&mut sink, OutboundPacket::Publish(publish)));
                    }
                    for id in 1..=200u16 {
                        window.complete(&mut sink, id);
                    }
                    black_box(sink.written.len())
                });
            },
        );
    }

    group.finish();
}

fn benchmark_inbound_flows(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("inbound_flows");

    group.bench_function("qos1_publish_puback", |b| {
        b.to_async(&runtime).iter(|| async {
            let config = EngineConfig::default().with_server_receive_maximum(100);
            let mut connection = ConnectionState::new();
            connection
                .accept_connect(
                    &packet::connect::ConnectPacket::new(ProtocolVersion::V5, "bench"),
                    &config,
                )
                .unwrap();
            let mut engine = QosEngine::new(
                &config,
                &connection,
                MemoryFlowStore::new(),
                RecordingSink::default(),
            );
            let mut terminator = RecordingTerminator::default();

            for id in 1..=100u16 {
                let publish = PublishPacket::new("bench/in", &b"payload"[..], QoS::AtLeastOnce)
                    .with_packet_id(id);
                engine
                    .on_inbound_publish(&connection, &publish, &mut terminator)
                    .await
                    .unwrap();
                engine
                    .send_puback(&connection, packet::puback::PubAckPacket::new(id))
                    .await
                    .unwrap();
            }
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = benchmark_publish_decoding, benchmark_fragmented_stream, benchmark_outbound_window, benchmark_inbound_flows
}
criterion_main!(benches);
