use bytes::Bytes;
use cf_core::bridge::Bridge;
use cf_core::consts::*;
use cf_core::crypt::CipherConfig;
use cf_core::error::Error;
use cf_core::obscure::{obscure, reveal};
use cf_core::session::{cipher_config, Session, StreamOptions};
use cf_core::stream::CipherStream;
use cf_core::test::{chunked, failing_after, rand_vec, Gauge, Lingering, TestSetup};
use futures::{StreamExt, TryStreamExt};
use std::io::{self, ErrorKind};
use std::time::Duration;

const LENGTHS: &[usize] = &[
    0,
    1,
    12,
    BLOCK_DATA_SIZE - 1,
    BLOCK_DATA_SIZE,
    BLOCK_DATA_SIZE + 1,
    4 * BLOCK_DATA_SIZE + 777,
];

const SOURCE_CHUNKS: &[usize] = &[1000, 65536, 100_000];

/// Drain a stream, keeping the bytes received before an error.
async fn drain(mut stream: CipherStream) -> (Vec<u8>, usize, Option<io::Error>) {
    let mut out = Vec::new();
    let mut chunks = 0;

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                assert!(!chunk.is_empty());
                chunks += 1;
                out.extend_from_slice(&chunk);
            }
            Err(e) => {
                assert!(stream.next().await.is_none(), "item after error");
                return (out, chunks, Some(e));
            }
        }
    }

    (out, chunks, None)
}

async fn seal(session: &Session, plain: &[u8], chunk_size: usize) -> Vec<u8> {
    let (sealed, _, e) = drain(session.encrypt_stream(chunked(plain, chunk_size)).unwrap()).await;
    assert!(e.is_none());
    sealed
}

#[tokio::test(flavor = "multi_thread")]
async fn test_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let session = TestSetup::new().session;

    for len in LENGTHS {
        for chunk_size in SOURCE_CHUNKS {
            let data = rand_vec(*len);
            let sealed = seal(&session, &data, *chunk_size).await;

            if *len > 0 {
                let blocks = (len + BLOCK_DATA_SIZE - 1) / BLOCK_DATA_SIZE;
                assert_eq!(sealed.len(), FILE_HEADER_SIZE + blocks * BLOCK_HEADER_SIZE + len);
                assert_eq!(&sealed[..FILE_MAGIC_SIZE], FILE_MAGIC);
            }

            let (opened, _, e) =
                drain(session.decrypt_stream(chunked(&sealed, *chunk_size)).unwrap()).await;
            assert!(e.is_none());
            assert_eq!(opened, data);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_output_chunks_are_bounded() {
    let options = StreamOptions {
        chunk_size: 4096,
        ..StreamOptions::default()
    };
    let session = Session::with_config(&cipher_config("secret", ""), options).unwrap();

    let data = rand_vec(100_000);
    let sealed: Vec<Bytes> = session
        .encrypt_stream(chunked(&data, 30_000))
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert!(sealed.iter().all(|c| c.len() <= 4096));
    assert_eq!(sealed.concat().len(), FILE_HEADER_SIZE + 2 * BLOCK_HEADER_SIZE + 100_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_length_sources() {
    let session = TestSetup::new().session;

    let (sealed, chunks, e) = drain(session.encrypt_stream(chunked(b"", 1)).unwrap()).await;
    assert!(sealed.is_empty());
    assert_eq!(chunks, 0);
    assert!(e.is_none());

    let (opened, chunks, e) = drain(session.decrypt_stream(chunked(b"", 1)).unwrap()).await;
    assert!(opened.is_empty());
    assert_eq!(chunks, 0);
    assert!(e.is_none());

    // Sources of empty chunks only are empty too.
    let empties = futures::stream::iter(vec![Ok(Bytes::new()), Ok(Bytes::new())]);
    let (sealed, chunks, e) = drain(session.encrypt_stream(empties).unwrap()).await;
    assert!(sealed.is_empty() && chunks == 0 && e.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_after_valid_blocks() {
    let session = TestSetup::new().session;
    let data = rand_vec(3 * BLOCK_DATA_SIZE);
    let sealed = seal(&session, &data, 65536).await;

    let failure = || io::Error::new(ErrorKind::ConnectionReset, "upload aborted");

    // Cut after two whole blocks, and halfway through the third.
    for cut in [
        FILE_HEADER_SIZE + 2 * BLOCK_SIZE,
        FILE_HEADER_SIZE + 2 * BLOCK_SIZE + BLOCK_SIZE / 2,
    ] {
        let chunks = sealed[..cut]
            .chunks(10_000)
            .map(Bytes::copy_from_slice)
            .collect();
        let source = failing_after(chunks, failure());

        let (opened, _, e) = drain(session.decrypt_stream(source).unwrap()).await;
        assert_eq!(opened, &data[..2 * BLOCK_DATA_SIZE]);

        let e = e.expect("truncated stream ended silently");
        assert_eq!(e.kind(), ErrorKind::ConnectionReset);
        assert_eq!(e.to_string(), "upload aborted");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corruption_is_reported_on_the_stream() {
    let session = TestSetup::new().session;
    let sealed = seal(&session, b"SECRET DATA", 4).await;

    let mut bad_magic = sealed.clone();
    bad_magic[0] ^= 1;

    let mut bad_block = sealed.clone();
    *bad_block.last_mut().unwrap() ^= 1;

    let cases = [
        (bad_magic, "not an encrypted file - bad magic string"),
        (bad_block, "failed to authenticate decrypted block - bad password?"),
        (sealed[..20].to_vec(), "file is too short to be encrypted"),
    ];

    for (input, message) in cases {
        // Setup succeeds, the error arrives on the stream.
        let stream = session.decrypt_stream(chunked(&input, 7)).unwrap();
        let (opened, _, e) = drain(stream).await;

        assert!(opened.is_empty());
        let e = e.unwrap();
        assert_eq!(e.kind(), ErrorKind::InvalidData);
        assert_eq!(e.to_string(), message);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_password() {
    let sealed = seal(&TestSetup::new().session, b"SECRET DATA", 4).await;

    let other = Session::initialize("hunter2", "").unwrap();
    let (_, _, e) = drain(other.decrypt_stream(chunked(&sealed, 100)).unwrap()).await;
    assert!(e.unwrap().to_string().contains("bad password?"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_at_most_one_pull_in_flight() {
    let session = TestSetup::new().session;
    let (source, stats) = Gauge::new(40, 10_000);

    let (sealed, _, e) = drain(session.encrypt_stream(source).unwrap()).await;
    assert!(e.is_none());
    assert_eq!(sealed.len(), FILE_HEADER_SIZE + 7 * BLOCK_HEADER_SIZE + 400_000);

    assert_eq!(stats.max_in_flight(), 1);
    assert_eq!(stats.completed(), 40);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_releases_source() {
    let session = TestSetup::new().session;

    // Blocked before the first chunk.
    let (source, dropped) = Lingering::new();
    let stream = session.encrypt_stream(source).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(stream);
    let released = tokio::task::spawn_blocking(move || dropped.wait(Duration::from_secs(5)));
    assert!(released.await.unwrap());

    // Blocked mid-block.
    let (source, dropped) = Lingering::with_prefix(Bytes::from_static(b"partial"));
    let stream = session.encrypt_stream(source).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(stream);
    let released = tokio::task::spawn_blocking(move || dropped.wait(Duration::from_secs(5)));
    assert!(released.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bridge() {
    let bridge = Bridge::new();

    let reply = bridge.encrypt_filename("report.txt");
    assert_eq!(reply.error.as_deref(), Some(Error::Uninitialized.to_string().as_str()));

    assert!(bridge.create_cipher("secret", Some("")).success);
    let encrypted = bridge.encrypt_filename("report.txt").into_result().unwrap();
    assert_eq!(
        bridge.decrypt_filename(&encrypted).into_result().unwrap(),
        "report.txt"
    );

    let status = bridge.configure(&CipherConfig::new("garbage!"));
    assert!(!status.success);

    let sealed: Vec<Bytes> = bridge
        .encrypt_stream(chunked(b"hello", 2))
        .into_result()
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let opened: Vec<Bytes> = bridge
        .decrypt_stream(chunked(&sealed.concat(), 5))
        .into_result()
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(opened.concat(), b"hello");
}

#[test]
fn test_obscure_reveal() {
    for secret in ["", "potato", "correct horse battery staple", "ünïcödé"] {
        assert_eq!(reveal(&obscure(secret)).unwrap(), secret);
    }

    let e = reveal("not-valid-base64!!").unwrap_err();
    assert!(matches!(e, Error::Reveal(_)));
}

#[test]
fn test_report_txt() {
    let session = Session::initialize("secret", "").unwrap();
    let encrypted = session.encrypt_name("report.txt");
    assert_eq!(session.decrypt_name(&encrypted).unwrap(), "report.txt");
}

#[test]
fn test_bad_obscured_password() {
    let e = Session::with_config(&CipherConfig::new("garbage!"), StreamOptions::default())
        .unwrap_err();
    assert!(matches!(e, Error::Config(_)));
}
