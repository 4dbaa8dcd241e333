use comms::msg::{Command, Msg, Payload};
use tokio::io;

#[tokio::test]
async fn send_recv_grad() {
    const SIZE: usize = 128;

    let grad = [0.25_f32, -1.5, 3.0];

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&Msg::Data(Payload::Grad(&grad))).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Grad(got)) => assert_eq!(got, grad),
        other => panic!("unexpected msg: {other:?}"),
    }
}

#[tokio::test]
async fn send_recv_many_frames_in_order() {
    const SIZE: usize = 1024;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);
    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let state = br#"{"updates":3}"#;
    let params = [1.0_f32; 16];

    tx.send(&Msg::Control(Command::Hello {
        rank: 1,
        world_size: 2,
    }))
    .await
    .unwrap();
    tx.send(&Msg::Data(Payload::State(state))).await.unwrap();
    tx.send(&Msg::Data(Payload::Params(&params))).await.unwrap();
    tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();

    let mut buf: Vec<u32> = Vec::new();

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(
        msg,
        Msg::Control(Command::Hello {
            rank: 1,
            world_size: 2
        })
    ));

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::State(got)) => assert_eq!(got, state),
        other => panic!("unexpected msg: {other:?}"),
    }

    match rx.recv_into(&mut buf).await.unwrap() {
        Msg::Data(Payload::Params(got)) => assert_eq!(got, params),
        other => panic!("unexpected msg: {other:?}"),
    }

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(msg, Msg::Control(Command::Disconnect)));
}

#[tokio::test]
async fn oversized_announced_frame_is_rejected() {
    use tokio::io::AsyncWriteExt;

    let (mut one, two) = io::duplex(64);
    one.write_all(&u64::MAX.to_be_bytes()).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    let err = rx.recv_into::<Msg, _>(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn closed_link_reads_end_of_stream_after_pending_frames() {
    let (one, two) = io::duplex(256);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);
    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();
    tx.close().await.unwrap();

    let mut buf: Vec<u32> = Vec::new();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(msg, Msg::Control(Command::Disconnect)));

    let err = rx.recv_into::<Msg, _>(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
}
