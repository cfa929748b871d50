//! Concurrency semantics: racing bucket creation and same-key writes.

mod common;

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use common::TestServer;

#[tokio::test]
async fn test_concurrent_create_bucket_single_winner() {
    let server = TestServer::start().await;
    let client = server.s3_client().await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let client = client.clone();
        tasks.spawn(async move { client.create_bucket().bucket("contested").send().await });
    }

    let mut successes = 0;
    let mut conflicts = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_eq!(
                    err.into_service_error().code(),
                    Some("BucketAlreadyExists")
                );
                conflicts += 1;
            }
        }
    }

    assert_eq!(successes, 1, "exactly one create wins");
    assert_eq!(conflicts, 7, "everyone else conflicts");
}

#[tokio::test]
async fn test_concurrent_puts_last_writer_wins_cleanly() {
    let server = TestServer::start().await;
    let client = server.s3_client().await;
    client.create_bucket().bucket("b").send().await.unwrap();

    // Each writer uploads a distinct, self-consistent body
    let bodies: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 8192]).collect();

    let mut tasks = tokio::task::JoinSet::new();
    for body in bodies.clone() {
        let client = client.clone();
        tasks.spawn(async move {
            client
                .put_object()
                .bucket("b")
                .key("contested")
                .body(ByteStream::from(body))
                .send()
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().expect("every PUT should succeed");
    }

    // The surviving object is exactly one of the written bodies, never a blend
    let got = client
        .get_object()
        .bucket("b")
        .key("contested")
        .send()
        .await
        .unwrap()
        .body
        .collect()
        .await
        .unwrap()
        .into_bytes();
    assert!(
        bodies.iter().any(|b| b.as_slice() == got.as_ref()),
        "object must match one writer's body"
    );
}

#[tokio::test]
async fn test_interleaved_multipart_uploads_are_isolated() {
    let server = TestServer::start().await;
    let client = server.s3_client().await;
    client.create_bucket().bucket("b").send().await.unwrap();

    // Two uploads to the same key, interleaved part writes
    let up_a = client
        .create_multipart_upload()
        .bucket("b")
        .key("k")
        .send()
        .await
        .unwrap()
        .upload_id
        .unwrap();
    let up_b = client
        .create_multipart_upload()
        .bucket("b")
        .key("k")
        .send()
        .await
        .unwrap()
        .upload_id
        .unwrap();
    assert_ne!(up_a, up_b);

    let etag_a = client
        .upload_part()
        .bucket("b")
        .key("k")
        .upload_id(&up_a)
        .part_number(1)
        .body(ByteStream::from_static(b"from upload A"))
        .send()
        .await
        .unwrap()
        .e_tag
        .unwrap();
    client
        .upload_part()
        .bucket("b")
        .key("k")
        .upload_id(&up_b)
        .part_number(1)
        .body(ByteStream::from_static(b"from upload B"))
        .send()
        .await
        .unwrap();

    // Completing A is unaffected by B's staged parts
    client
        .complete_multipart_upload()
        .bucket("b")
        .key("k")
        .upload_id(&up_a)
        .multipart_upload(
            aws_sdk_s3::types::CompletedMultipartUpload::builder()
                .parts(
                    aws_sdk_s3::types::CompletedPart::builder()
                        .part_number(1)
                        .e_tag(&etag_a)
                        .build(),
                )
                .build(),
        )
        .send()
        .await
        .unwrap();

    let got = client
        .get_object()
        .bucket("b")
        .key("k")
        .send()
        .await
        .unwrap()
        .body
        .collect()
        .await
        .unwrap()
        .into_bytes();
    assert_eq!(got.as_ref(), b"from upload A");

    // B can still be aborted independently
    client
        .abort_multipart_upload()
        .bucket("b")
        .key("k")
        .upload_id(&up_b)
        .send()
        .await
        .unwrap();
}
