use crate::address::AddressingMode;
use crate::config::Configuration;
use crate::error::Error;
use crate::frame::SEQUENCE_POISONED;
use crate::link::CanFormat;
use crate::mocks::{MockBus, TestClock, TestDelay};
use crate::session::IsoTp;
use alloc::vec;
use alloc::vec::Vec;
use mockall::Sequence;

fn build_session(bus: MockBus, config: &Configuration) -> IsoTp<MockBus, TestDelay, TestClock> {
    IsoTp::new(bus, TestDelay::new(), config).unwrap()
}

#[test]
fn test_send_single_frame() {
    let clock = TestClock::new(vec![]);

    let mut bus = MockBus::new();
    bus.expect_transmit().times(1).returning(|frame, _timeout| {
        assert_eq!([0x07, 0xEA, 0xEA, 0xEA, 0xEA, 0xEA, 0xEA, 0xEA], frame);
        Ok(frame.len())
    });

    let mut session = build_session(bus, &Configuration::default());

    assert_eq!(Ok(7), session.send(&[0xEA; 7], 100_000, &clock));
}

#[test]
fn test_receive_single_frame() {
    let clock = TestClock::new(vec![]);

    let mut bus = MockBus::new();
    bus.expect_receive().times(1).returning(|frame, _timeout| {
        frame[..8].copy_from_slice(&[0x07, 0xEA, 0xEA, 0xEA, 0xEA, 0xEA, 0xEA, 0xEA]);
        Ok(8)
    });

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 7];

    assert_eq!(Ok(7), session.receive(&mut buffer, 0, 0, 100_000, &clock));
    assert_eq!([0xEA; 7], buffer);
    assert_eq!(0, session.transfer.total);
}

#[test]
fn test_send_multi_frame() {
    let clock = TestClock::new(vec![
        100, // First frame sent: Timer start
        200, // First expiration check
    ]);
    let payload: Vec<u8> = (0..20).map(|i| 0xB0 + i as u8).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x10, 0x14, 0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5], frame);
        Ok(frame.len())
    });
    // clear to send, all frames at once, no separation time
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x30, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x21, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC], frame);
        Ok(frame.len())
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x22, 0xBD, 0xBE, 0xBF, 0xC0, 0xC1, 0xC2, 0xC3], frame);
        Ok(frame.len())
    });

    let mut session = build_session(bus, &Configuration::default());

    assert_eq!(Ok(20), session.send(&payload, 100_000, &clock));
    // STmin of zero paces nothing
    assert!(session.delay.pauses.is_empty());
}

#[test]
fn test_receive_multi_frame() {
    let clock = TestClock::new(vec![
        100, // Flow control sent: Timer start
        200, // First expiration check
        300, // Timer restart after first consecutive frame
        400, // Second expiration check
    ]);
    let payload: Vec<u8> = (0..20).map(|i| 0xC0 + i as u8).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x10, 0x14, 0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x30, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC], frame);
        Ok(frame.len())
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x21, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC]);
        Ok(8)
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x22, 0xCD, 0xCE, 0xCF, 0xD0, 0xD1, 0xD2, 0xD3]);
        Ok(8)
    });

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 20];

    assert_eq!(Ok(20), session.receive(&mut buffer, 0, 0, 100_000, &clock));
    assert_eq!(payload[..], buffer[..]);
}

#[test]
fn test_receive_sequence_mismatch_aborts() {
    let clock = TestClock::new(vec![
        100, // Flow control sent: Timer start
        200, // First expiration check
    ]);

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x10, 0x14, 0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!(0x30, frame[0]);
        Ok(frame.len())
    });
    // SN 2 while SN 1 is expected
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x22, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC]);
        Ok(8)
    });

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 20];

    assert_eq!(
        Err(Error::ConnectionAborted),
        session.receive(&mut buffer, 0, 0, 100_000, &clock)
    );
    assert_eq!(SEQUENCE_POISONED, session.transfer.sequence);

    session.reset();
    assert_eq!(0, session.transfer.sequence);
}

#[test]
fn test_receive_times_out_without_consecutive_frame() {
    let clock = TestClock::new(vec![
        100,       // Flow control sent: Timer start
        200,       // First expiration check
        1_100_300, // Second expiration check, N_Cr elapsed
    ]);

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x10, 0x14, 0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!(0x30, frame[0]);
        Ok(frame.len())
    });
    // driver budget elapses without a frame
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|_, _| Ok(0));

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 20];

    assert_eq!(Err(Error::TimedOut), session.receive(&mut buffer, 0, 0, 100_000, &clock));
}

#[test]
fn test_send_aborts_after_wait_frame_limit() {
    let clock = TestClock::new(vec![
        100, // First frame sent: Timer start
        200, // First expiration check
        300, // Timer restart after first wait
        400, // Second expiration check
        500, // Timer restart after second wait
        600, // Third expiration check
        700, // Timer restart after third wait
        800, // Fourth expiration check
    ]);
    let payload: Vec<u8> = (0..20).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x10, 0x14], frame[..2]);
        Ok(frame.len())
    });
    bus.expect_receive().times(4).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x31, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });

    let config = Configuration {
        fc_wait_max: 3,
        ..Configuration::default()
    };
    let mut session = build_session(bus, &config);

    assert_eq!(Err(Error::ConnectionAborted), session.send(&payload, 100_000, &clock));
}

#[test]
fn test_send_fd_escape_single_frame() {
    let clock = TestClock::new(vec![]);
    let payload: Vec<u8> = (0..62).map(|i| i as u8).collect();

    let mut bus = MockBus::new();
    let expected = payload.clone();
    bus.expect_transmit().times(1).returning(move |frame, _| {
        assert_eq!(64, frame.len());
        assert_eq!([0x00, 0x3E], frame[..2]);
        assert_eq!(expected[..], frame[2..]);
        Ok(frame.len())
    });

    let config = Configuration {
        format: CanFormat::Fd,
        ..Configuration::default()
    };
    let mut session = build_session(bus, &config);

    assert_eq!(Ok(62), session.send(&payload, 100_000, &clock));
}

#[test]
fn test_send_aborts_on_overflow_report() {
    let clock = TestClock::new(vec![
        100, // First frame sent: Timer start
        200, // First expiration check
    ]);
    let payload: Vec<u8> = (0..20).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x10, 0x14], frame[..2]);
        Ok(frame.len())
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x32, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });

    let mut session = build_session(bus, &Configuration::default());

    assert_eq!(Err(Error::ConnectionAborted), session.send(&payload, 100_000, &clock));
}

#[test]
fn test_send_aborts_on_reserved_flow_status() {
    let clock = TestClock::new(vec![
        100, // First frame sent: Timer start
        200, // First expiration check
    ]);
    let payload: Vec<u8> = (0..20).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x10, 0x14], frame[..2]);
        Ok(frame.len())
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x33, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });

    let mut session = build_session(bus, &Configuration::default());

    assert_eq!(Err(Error::BadMessage), session.send(&payload, 100_000, &clock));
}

#[test]
fn test_send_paces_blocks_with_separation_time() {
    let clock = TestClock::new(vec![
        100, // First frame sent: Timer start
        200, // First expiration check
        300, // Block exhausted: Timer restart
        400, // Second expiration check
    ]);
    let payload: Vec<u8> = (0..25).map(|i| 0xA0 + i as u8).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x10, 0x19, 0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5], frame);
        Ok(frame.len())
    });
    // clear to send: blocks of two, STmin 1 ms
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x30, 0x02, 0x01, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x21, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC], frame);
        Ok(frame.len())
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x22, 0xAD, 0xAE, 0xAF, 0xB0, 0xB1, 0xB2, 0xB3], frame);
        Ok(frame.len())
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x30, 0x02, 0x01, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x23, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xCC, 0xCC], frame);
        Ok(frame.len())
    });

    let mut session = build_session(bus, &Configuration::default());

    assert_eq!(Ok(25), session.send(&payload, 100_000, &clock));
    // paced between consecutive frames, not after the last one of a transfer
    assert_eq!(vec![1_000, 1_000], session.delay.pauses);
    assert_eq!(2, session.fc_block_size);
    assert_eq!(1_000, session.fc_separation_us);
}

#[test]
fn test_receive_reissues_flow_control_per_block() {
    let clock = TestClock::new(vec![
        100, // Flow control sent: Timer start
        200, // First expiration check
        300, // Timer restart
        400, // Second expiration check
        500, // Timer restart after block renewal
        600, // Third expiration check
    ]);
    let payload: Vec<u8> = (0..25).map(|i| 0xA0 + i as u8).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x10, 0x19, 0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x30, 0x02, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC], frame);
        Ok(frame.len())
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x21, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC]);
        Ok(8)
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x22, 0xAD, 0xAE, 0xAF, 0xB0, 0xB1, 0xB2, 0xB3]);
        Ok(8)
    });
    // block of two exhausted, a new clear to send goes out
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x30, 0x02, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC], frame);
        Ok(frame.len())
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x23, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xCC, 0xCC]);
        Ok(8)
    });

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 25];

    assert_eq!(Ok(25), session.receive(&mut buffer, 2, 0, 100_000, &clock));
    assert_eq!(payload[..], buffer[..]);
}

#[test]
fn test_receive_overflow_replies_flow_control() {
    let clock = TestClock::new(vec![]);

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x10, 0x14, 0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x32, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC], frame);
        Ok(frame.len())
    });

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 10];

    assert_eq!(Err(Error::Overflow), session.receive(&mut buffer, 0, 0, 100_000, &clock));
}

#[test]
fn test_send_ignores_stray_frames_while_waiting_for_flow_control() {
    let clock = TestClock::new(vec![
        100, // First frame sent: Timer start
        200, // First expiration check
        300, // Second expiration check
    ]);
    let payload: Vec<u8> = (0..8).map(|i| 0x40 + i as u8).collect();

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x10, 0x08, 0x40, 0x41, 0x42, 0x43, 0x44, 0x45], frame);
        Ok(frame.len())
    });
    // a stray single frame is not flow control
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x01, 0x11, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x30, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!([0x21, 0x46, 0x47, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC], frame);
        Ok(frame.len())
    });

    let mut session = build_session(bus, &Configuration::default());

    assert_eq!(Ok(8), session.send(&payload, 100_000, &clock));
}

#[test]
fn test_receive_ignores_stray_frames_while_waiting_for_consecutive() {
    let clock = TestClock::new(vec![
        100, // Flow control sent: Timer start
        200, // First expiration check
        300, // Second expiration check
    ]);

    let mut seq = Sequence::new();
    let mut bus = MockBus::new();

    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x10, 0x0A, 0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5]);
        Ok(8)
    });
    bus.expect_transmit().times(1).in_sequence(&mut seq).returning(|frame, _| {
        assert_eq!(0x30, frame[0]);
        Ok(frame.len())
    });
    // a stray flow control is not a consecutive frame
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x30, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });
    bus.expect_receive().times(1).in_sequence(&mut seq).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x21, 0xC6, 0xC7, 0xC8, 0xC9, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 10];

    assert_eq!(Ok(10), session.receive(&mut buffer, 0, 0, 100_000, &clock));
    assert_eq!([0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9], buffer);
}

#[test]
fn test_driver_error_is_fatal() {
    let clock = TestClock::new(vec![]);

    let mut bus = MockBus::new();
    bus.expect_receive().times(1).returning(|_, _| Err(Error::Fault));

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 8];

    assert_eq!(Err(Error::Fault), session.receive(&mut buffer, 0, 0, 100_000, &clock));
}

#[test]
fn test_receive_surfaces_elapsed_driver_budget_when_idle() {
    let clock = TestClock::new(vec![]);

    let mut bus = MockBus::new();
    bus.expect_receive().times(1).returning(|_, _| Ok(0));

    let mut session = build_session(bus, &Configuration::default());
    let mut buffer = [0u8; 8];

    assert_eq!(Err(Error::TimedOut), session.receive(&mut buffer, 0, 0, 100_000, &clock));
}

#[test]
fn test_extended_addressing_prefixes_outgoing_frames() {
    let clock = TestClock::new(vec![]);

    let mut bus = MockBus::new();
    bus.expect_transmit().times(1).returning(|frame, _| {
        assert_eq!([0x55, 0x06, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42], frame);
        Ok(frame.len())
    });

    let config = Configuration {
        addressing: AddressingMode::Extended,
        ..Configuration::default()
    };
    let mut session = build_session(bus, &config);
    session.set_address_extension(0x55);

    assert_eq!(Ok(6), session.send(&[0x42; 6], 100_000, &clock));
}

#[test]
fn test_extended_addressing_captures_received_extension() {
    let clock = TestClock::new(vec![]);

    let mut bus = MockBus::new();
    bus.expect_receive().times(1).returning(|frame, _| {
        frame[..8].copy_from_slice(&[0x77, 0x03, 0x01, 0x02, 0x03, 0xCC, 0xCC, 0xCC]);
        Ok(8)
    });

    let config = Configuration {
        addressing: AddressingMode::Extended,
        ..Configuration::default()
    };
    let mut session = build_session(bus, &config);
    session.set_address_extension(0x55);

    let mut buffer = [0u8; 8];
    assert_eq!(Ok(3), session.receive(&mut buffer, 0, 0, 100_000, &clock));
    assert_eq!([0x01, 0x02, 0x03], buffer[..3]);
    assert_eq!(0x77, session.address_extension());
}
