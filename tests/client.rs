//! End-to-end client exchanges against a scripted broker.
//!
//! The transport is an in-memory byte script: tests queue the broker's
//! replies up front and inspect the bytes the client put on the wire. Time
//! is a thread-local fake clock that the transport advances whenever the
//! client blocks on an empty script, so keep-alive behaviour is fully
//! deterministic.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use libmqtt::mqtt::{
    Client, ConnectOptions, ConnectReturnCode, Message, OwnedMessage, QoS, SubackReturnCode,
};
use libmqtt::network::error::Error;
use libmqtt::network::{Close, Connection, Read, Write};
use libmqtt::platform::Timer;

thread_local! {
    static CLOCK_MS: Cell<u64> = const { Cell::new(0) };
}

fn now_ms() -> u64 {
    CLOCK_MS.with(|clock| clock.get())
}

fn advance(ms: u64) {
    CLOCK_MS.with(|clock| clock.set(clock.get() + ms));
}

/// A countdown timer over the fake clock.
#[derive(Default)]
struct FakeTimer {
    deadline_ms: u64,
}

impl Timer for FakeTimer {
    fn countdown(&mut self, ms: u32) {
        self.deadline_ms = now_ms() + u64::from(ms);
    }

    fn left(&self) -> u32 {
        self.deadline_ms.saturating_sub(now_ms()) as u32
    }

    fn expired(&self) -> bool {
        now_ms() >= self.deadline_ms
    }
}

#[derive(Default)]
struct Script {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    closed: bool,
}

/// A transport whose inbound bytes are scripted by the test. Cloning
/// shares the script, so the test keeps a handle after the client takes
/// ownership of its copy.
#[derive(Clone, Default)]
struct ScriptTransport(Rc<RefCell<Script>>);

impl ScriptTransport {
    fn reply(&self, bytes: &[u8]) {
        self.0.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().outbound)
    }

    fn close_peer(&self) {
        self.0.borrow_mut().closed = true;
    }
}

impl Read for ScriptTransport {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        let mut script = self.0.borrow_mut();
        if script.inbound.is_empty() {
            if script.closed {
                return Ok(0);
            }
            // block until the deadline, then report that nothing arrived
            advance(u64::from(timeout_ms));
            return Err(Error::Timeout);
        }
        let n = buf.len().min(script.inbound.len());
        for slot in buf[..n].iter_mut() {
            *slot = script.inbound.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for ScriptTransport {
    type Error = Error;

    fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
        self.0.borrow_mut().outbound.extend_from_slice(buf);
        Ok(buf.len())
    }
}

impl Close for ScriptTransport {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for ScriptTransport {}

const COMMAND_TIMEOUT_MS: u32 = 1_000;

fn connected_client<'a>(
    broker: &ScriptTransport,
    send_buf: &'a mut [u8],
    recv_buf: &'a mut [u8],
    keep_alive_seconds: u16,
) -> Client<'a, ScriptTransport, FakeTimer> {
    let mut client = Client::new(broker.clone(), COMMAND_TIMEOUT_MS, send_buf, recv_buf);
    broker.reply(&[0x20, 0x02, 0x00, 0x00]);
    let options = ConnectOptions {
        client_id: "dev-1",
        keep_alive_seconds,
        ..Default::default()
    };
    client.connect(&options).unwrap();
    broker.take_sent();
    client
}

#[test]
fn connect_publish_qos0_disconnect() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client: Client<'_, _, FakeTimer> =
        Client::new(broker.clone(), COMMAND_TIMEOUT_MS, &mut send_buf, &mut recv_buf);

    broker.reply(&[0x20, 0x02, 0x00, 0x00]);
    let options = ConnectOptions {
        client_id: "test",
        keep_alive_seconds: 60,
        ..Default::default()
    };
    client.connect(&options).unwrap();
    assert!(client.is_connected());

    let connect_bytes = broker.take_sent();
    assert_eq!(connect_bytes[0], 0x10);
    assert!(connect_bytes.windows(4).any(|window| window == b"MQTT"));

    let mut message = Message::new(b"hi", QoS::AtMostOnce);
    client.publish("a/b", &mut message).unwrap();
    assert_eq!(
        broker.take_sent(),
        [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']
    );

    client.disconnect().unwrap();
    assert_eq!(broker.take_sent(), [0xE0, 0x00]);
    assert!(!client.is_connected());
}

#[test]
fn connecting_twice_fails_fast() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    let options = ConnectOptions::default();
    assert_eq!(client.connect(&options), Err(Error::AlreadyConnected));
    assert!(broker.take_sent().is_empty());
}

#[test]
fn broker_refusal_surfaces_the_return_code() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client: Client<'_, _, FakeTimer> =
        Client::new(broker.clone(), COMMAND_TIMEOUT_MS, &mut send_buf, &mut recv_buf);

    broker.reply(&[0x20, 0x02, 0x00, 0x05]);
    let err = client.connect(&ConnectOptions::default()).unwrap_err();
    assert_eq!(
        err,
        Error::ConnectionRefused(ConnectReturnCode::NotAuthorized)
    );
    assert!(!client.is_connected());
}

#[test]
fn connect_times_out_without_connack() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client: Client<'_, _, FakeTimer> =
        Client::new(broker.clone(), COMMAND_TIMEOUT_MS, &mut send_buf, &mut recv_buf);

    assert_eq!(
        client.connect(&ConnectOptions::default()),
        Err(Error::Timeout)
    );
    assert!(!client.is_connected());
}

#[test]
fn publish_qos1_handshake() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    broker.reply(&[0x40, 0x02, 0x00, 0x02]);
    let mut message = Message::new(b"x", QoS::AtLeastOnce);
    client.publish("t", &mut message).unwrap();

    assert_eq!(message.id, 2);
    assert_eq!(
        broker.take_sent(),
        [0x32, 0x06, 0x00, 0x01, b't', 0x00, 0x02, b'x']
    );
}

#[test]
fn puback_with_mismatched_id_still_completes_the_publish() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    broker.reply(&[0x40, 0x02, 0x12, 0x34]);
    let mut message = Message::new(b"x", QoS::AtLeastOnce);
    assert_eq!(client.publish("t", &mut message), Ok(()));
}

#[test]
fn publish_qos2_handshake() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    broker.reply(&[0x50, 0x02, 0x00, 0x02]); // PUBREC
    broker.reply(&[0x70, 0x02, 0x00, 0x02]); // PUBCOMP
    let mut message = Message::new(b"x", QoS::ExactlyOnce);
    client.publish("t", &mut message).unwrap();

    let sent = broker.take_sent();
    // PUBLISH with QoS 2 flags, then the PUBREL for the broker's PUBREC
    assert_eq!(sent[0], 0x34);
    assert_eq!(&sent[sent.len() - 4..], &[0x62, 0x02, 0x00, 0x02]);
}

#[test]
fn subscribe_and_inbound_delivery() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let received: Rc<RefCell<Vec<OwnedMessage>>> = Rc::default();
    let sink = received.clone();
    let mut handler = move |topic: &str, message: &Message<'_>| {
        sink.borrow_mut()
            .push(OwnedMessage::copy_from(topic, message).unwrap());
    };
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);
    client.set_message_handler(&mut handler);

    broker.reply(&[0x90, 0x03, 0x00, 0x02, 0x01]);
    let granted = client.subscribe("s/#", QoS::AtLeastOnce).unwrap();
    assert_eq!(granted, SubackReturnCode::Granted(QoS::AtLeastOnce));
    assert_eq!(
        broker.take_sent(),
        [0x82, 0x08, 0x00, 0x02, 0x00, 0x03, b's', b'/', b'#', 0x01]
    );

    broker.reply(&[0x30, 0x06, 0x00, 0x03, b's', b'/', b'x', b'y']);
    client.poll(50).unwrap();

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].topic.as_str(), "s/x");
    assert_eq!(&received[0].payload[..], b"y");
    assert_eq!(received[0].qos, QoS::AtMostOnce);
}

#[test]
fn inbound_qos1_publish_is_acknowledged() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let received: Rc<RefCell<Vec<OwnedMessage>>> = Rc::default();
    let sink = received.clone();
    let mut handler = move |topic: &str, message: &Message<'_>| {
        sink.borrow_mut()
            .push(OwnedMessage::copy_from(topic, message).unwrap());
    };
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);
    client.set_message_handler(&mut handler);

    broker.reply(&[0x32, 0x08, 0x00, 0x03, b's', b'/', b'x', 0x00, 0x05, b'y']);
    client.poll(50).unwrap();

    assert_eq!(received.borrow().len(), 1);
    assert_eq!(&received.borrow()[0].payload[..], b"y");
    // the client acknowledged delivery with the publisher's packet id
    assert_eq!(broker.take_sent(), [0x40, 0x02, 0x00, 0x05]);
}

#[test]
fn unsubscribe_round_trip() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    broker.reply(&[0xB0, 0x02, 0x00, 0x02]);
    client.unsubscribe("s/#").unwrap();
    assert_eq!(
        broker.take_sent(),
        [0xA2, 0x07, 0x00, 0x02, 0x00, 0x03, b's', b'/', b'#']
    );
}

#[test]
fn subscription_refusal_is_reported_as_a_value() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    broker.reply(&[0x90, 0x03, 0x00, 0x02, 0x80]);
    let granted = client.subscribe("not/allowed/#", QoS::ExactlyOnce).unwrap();
    assert_eq!(granted, SubackReturnCode::Failure);
}

#[test]
fn keep_alive_ping_round_trip() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 1);

    // one keep-alive interval passes with no traffic in either direction
    client.poll(1_500).unwrap();
    assert_eq!(broker.take_sent(), [0xC0, 0x00]);

    broker.reply(&[0xD0, 0x00]);
    client.poll(100).unwrap();

    // the response arrived in time, so staying inside the response window
    // must not report a lost connection
    client.poll(500).unwrap();
    assert!(client.is_connected());
}

#[test]
fn missed_ping_response_is_a_lost_connection() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 1);

    client.poll(1_500).unwrap();
    assert_eq!(broker.take_sent(), [0xC0, 0x00]);

    // the response window is the command timeout; let it lapse
    assert_eq!(client.poll(1_200), Err(Error::ConnectionLost));
    assert!(!client.is_connected());

    let mut message = Message::new(b"x", QoS::AtMostOnce);
    assert_eq!(client.publish("t", &mut message), Err(Error::NotConnected));
    assert!(broker.take_sent().is_empty());
}

#[test]
fn outbound_traffic_defers_the_keep_alive_ping() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 2);

    client.poll(1_500).unwrap();
    assert!(broker.take_sent().is_empty());

    // a successful send restarts the keep-alive countdown in full
    let mut message = Message::new(b"23.5", QoS::AtMostOnce);
    client.publish("s/t", &mut message).unwrap();
    broker.take_sent();

    client.poll(1_900).unwrap();
    assert!(broker.take_sent().is_empty());

    client.poll(200).unwrap();
    assert_eq!(broker.take_sent(), [0xC0, 0x00]);
}

#[test]
fn zero_byte_read_is_connection_lost() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    broker.close_peer();
    assert_eq!(client.poll(100), Err(Error::ConnectionLost));
    assert!(!client.is_connected());

    assert_eq!(
        client.subscribe("s/#", QoS::AtMostOnce),
        Err(Error::NotConnected)
    );
    assert!(broker.take_sent().is_empty());
}

#[test]
fn timeout_after_the_header_byte_is_not_a_failure() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    // only the header byte of a PUBLISH arrives before the deadline
    broker.reply(&[0x30]);
    assert_eq!(client.poll(100), Ok(()));
    assert!(client.is_connected());
    assert!(broker.take_sent().is_empty());
}

#[test]
fn timeout_mid_body_drops_the_packet_quietly() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    // header and remaining length arrive, but only three of the six
    // body bytes
    broker.reply(&[0x30, 0x06, 0x00, 0x03, b's']);
    assert_eq!(client.poll(100), Ok(()));
    assert!(client.is_connected());
    assert!(broker.take_sent().is_empty());
}

#[test]
fn packet_ids_increment_from_two_and_wrap() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 256];
    let mut recv_buf = [0u8; 256];
    let mut client = connected_client(&broker, &mut send_buf, &mut recv_buf, 60);

    let mut ids = Vec::new();
    for _ in 0..4 {
        broker.reply(&[0x40, 0x02, 0x00, 0x00]);
        let mut message = Message::new(b"x", QoS::AtLeastOnce);
        client.publish("t", &mut message).unwrap();
        ids.push(message.id);
    }
    assert_eq!(ids, [2, 3, 4, 5]);

    // drive the counter through a full wrap
    for _ in 0..65_535 {
        broker.reply(&[0x40, 0x02, 0x00, 0x00]);
        let mut message = Message::new(b"x", QoS::AtLeastOnce);
        client.publish("t", &mut message).unwrap();
        ids.push(message.id);
        broker.take_sent();
    }
    assert!(!ids.contains(&0));
    let wrap = ids.iter().position(|&id| id == 65_535).unwrap();
    assert_eq!(ids[wrap + 1], 1);
    assert_eq!(ids[wrap + 2], 2);
}

#[test]
fn oversized_packet_is_rejected_before_any_transport_write() {
    let broker = ScriptTransport::default();
    let mut send_buf = [0u8; 8];
    let mut recv_buf = [0u8; 64];
    let mut client: Client<'_, _, FakeTimer> =
        Client::new(broker.clone(), COMMAND_TIMEOUT_MS, &mut send_buf, &mut recv_buf);

    let options = ConnectOptions {
        client_id: "much-too-long-for-this-buffer",
        ..Default::default()
    };
    assert_eq!(client.connect(&options), Err(Error::BufferSize));
    assert!(broker.take_sent().is_empty());
}

#[test]
fn publish_codec_round_trips_random_messages() {
    use libmqtt::mqtt::packet::{decode_publish, encode_publish};
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let mut buf = [0u8; 512];

    for _ in 0..200 {
        let levels = rng.gen_range(1..4);
        let mut topic = String::new();
        for level in 0..levels {
            if level > 0 {
                topic.push('/');
            }
            for _ in 0..rng.gen_range(1..8) {
                topic.push(rng.gen_range(b'a'..=b'z') as char);
            }
        }
        let payload: Vec<u8> = (0..rng.gen_range(0..64)).map(|_| rng.r#gen()).collect();

        let qos = match rng.gen_range(0..3) {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        };
        let mut message = Message::new(&payload, qos);
        message.retained = rng.r#gen();
        if qos != QoS::AtMostOnce {
            message.dup = rng.r#gen();
            message.id = rng.gen_range(1..=u16::MAX);
        }

        let len = encode_publish(&mut buf, &topic, &message).unwrap();
        let (decoded_topic, decoded) = decode_publish(&buf[..len]).unwrap();
        assert_eq!(decoded_topic, topic);
        assert_eq!(decoded, message);
    }
}
