//! Object-level operations composed from gateway calls

use crate::error::{GatewayResult, ResourceError};
use crate::gateway::{CloudGateway, ObjectSummary, VersionMarker};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};

/// Largest batch a single multi-object delete accepts
pub const DELETE_BATCH_SIZE: usize = 1000;

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily list every object in `bucket`, following continuation tokens.
///
/// Pages are fetched only as the stream is polled. Calling this again
/// starts a new listing from the first page.
pub fn list_objects<'a, G>(
    gateway: &'a G,
    bucket: &'a str,
    prefix: Option<&'a str>,
) -> BoxStream<'a, GatewayResult<ObjectSummary>>
where
    G: CloudGateway + ?Sized,
{
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let token = match cursor {
            Cursor::Done => return Ok(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };

        let page = gateway
            .list_objects_page(bucket, prefix, token.as_deref())
            .await?;

        let next = match page.next_token {
            // A repeated token would loop forever
            Some(next) if Some(&next) != token.as_ref() => Cursor::Next(next),
            _ => Cursor::Done,
        };
        Ok::<_, ResourceError>(Some((page.objects, next)))
    })
    .map_ok(|objects| stream::iter(objects.into_iter().map(Ok::<_, ResourceError>)))
    .try_flatten()
    .boxed()
}

/// Delete every object in `bucket`, returning how many were removed.
///
/// Safe to re-invoke after a partial failure: objects deleted by an earlier
/// attempt are simply absent from the next listing.
pub async fn empty_bucket<G>(gateway: &G, bucket: &str) -> GatewayResult<usize>
where
    G: CloudGateway + ?Sized,
{
    let mut removed = 0;
    let mut batch: Vec<String> = Vec::with_capacity(DELETE_BATCH_SIZE);
    let mut objects = list_objects(gateway, bucket, None);

    while let Some(object) = objects.try_next().await? {
        batch.push(object.key);
        if batch.len() == DELETE_BATCH_SIZE {
            removed += gateway.delete_objects(bucket, &batch).await?;
            tracing::debug!("Deleted {} objects from {}", removed, bucket);
            batch.clear();
        }
    }
    if !batch.is_empty() {
        removed += gateway.delete_objects(bucket, &batch).await?;
    }

    tracing::info!("Emptied bucket {} ({} objects)", bucket, removed);
    Ok(removed)
}

/// Delete every stored version and delete marker in `bucket`.
///
/// A versioned bucket still holds these after [`empty_bucket`] and cannot be
/// deleted until they are gone. Restartable like [`empty_bucket`].
pub async fn purge_object_versions<G>(gateway: &G, bucket: &str) -> GatewayResult<usize>
where
    G: CloudGateway + ?Sized,
{
    let mut removed = 0;
    let mut marker: Option<VersionMarker> = None;

    loop {
        let page = gateway
            .list_object_versions_page(bucket, marker.as_ref())
            .await?;
        for batch in page.versions.chunks(DELETE_BATCH_SIZE) {
            removed += gateway.delete_object_versions(bucket, batch).await?;
        }
        marker = match page.next {
            Some(next) if Some(&next) != marker.as_ref() => Some(next),
            _ => break,
        };
    }

    tracing::info!("Purged {} versions from {}", removed, bucket);
    Ok(removed)
}

/// Normalize a folder path into a marker key (`a/b` -> `a/b/`)
pub fn folder_marker_key(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("{}/", trimmed)
}

/// Create a zero-length `folder/` marker object
pub async fn create_folder_marker<G>(gateway: &G, bucket: &str, path: &str) -> GatewayResult<String>
where
    G: CloudGateway + ?Sized,
{
    let key = folder_marker_key(path);
    gateway.put_empty_object(bucket, &key).await?;
    Ok(key)
}

/// Result of a copy-then-delete move
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// Object now lives only at the destination
    Moved,
    /// Copy succeeded but removing the source failed; the object exists at
    /// both keys. Recoverable by deleting the source again.
    Duplicated { source_error: ResourceError },
}

/// Move an object by copying it and deleting the source.
///
/// Not atomic: a failure of the delete leg leaves a duplicate, reported as
/// [`MoveOutcome::Duplicated`] rather than as an error.
pub async fn move_object<G>(
    gateway: &G,
    bucket: &str,
    from_key: &str,
    to_key: &str,
) -> GatewayResult<MoveOutcome>
where
    G: CloudGateway + ?Sized,
{
    if from_key == to_key {
        return Ok(MoveOutcome::Moved);
    }

    gateway.copy_object(bucket, from_key, to_key).await?;

    match gateway.delete_object(bucket, from_key).await {
        Ok(()) => Ok(MoveOutcome::Moved),
        Err(e) if e.is_not_found() => Ok(MoveOutcome::Moved),
        Err(e) => {
            tracing::warn!(
                "Copied {} to {} but could not delete the source: {}",
                from_key,
                to_key,
                e
            );
            Ok(MoveOutcome::Duplicated { source_error: e })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{GatewayOp, InMemoryGateway};

    fn bucket_with(count: usize) -> InMemoryGateway {
        let keys: Vec<String> = (0..count).map(|i| format!("file-{:04}.txt", i)).collect();
        InMemoryGateway::new().with_bucket("assets", keys)
    }

    #[tokio::test]
    async fn test_listing_follows_continuation_tokens() {
        let gateway = bucket_with(25).with_page_size(10);

        let objects: Vec<ObjectSummary> = list_objects(&gateway, "assets", None)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(objects.len(), 25);
        assert_eq!(gateway.call_count(GatewayOp::ListObjects), 3);
    }

    #[tokio::test]
    async fn test_listing_with_prefix() {
        let gateway = InMemoryGateway::new().with_bucket(
            "assets",
            vec!["img/a.png".into(), "img/b.png".into(), "css/site.css".into()],
        );

        let objects: Vec<ObjectSummary> = list_objects(&gateway, "assets", Some("img/"))
            .try_collect()
            .await
            .unwrap();

        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["img/a.png", "img/b.png"]);
    }

    #[tokio::test]
    async fn test_listing_is_lazy() {
        let gateway = bucket_with(30).with_page_size(10);

        let first = list_objects(&gateway, "assets", None).try_next().await.unwrap();
        assert!(first.is_some());
        assert_eq!(gateway.call_count(GatewayOp::ListObjects), 1);
    }

    #[tokio::test]
    async fn test_empty_bucket_batches_deletes() {
        let gateway = bucket_with(2_500);

        let removed = empty_bucket(&gateway, "assets").await.unwrap();

        assert_eq!(removed, 2_500);
        assert_eq!(gateway.call_count(GatewayOp::DeleteObjects), 3);
        assert_eq!(gateway.object_count("assets"), 0);
    }

    #[tokio::test]
    async fn test_empty_bucket_resumes_after_partial_failure() {
        let gateway = bucket_with(1_500);
        gateway.fail_nth(GatewayOp::DeleteObjects, 2, ErrorKind::Transient);

        let err = empty_bucket(&gateway, "assets").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(gateway.object_count("assets"), 500);

        let removed = empty_bucket(&gateway, "assets").await.unwrap();
        assert_eq!(removed, 500);
        assert_eq!(gateway.object_count("assets"), 0);
    }

    #[tokio::test]
    async fn test_purge_versions_pages_through_markers() {
        let keys: Vec<String> = (0..12).map(|i| format!("v-{:02}.txt", i)).collect();
        let gateway = InMemoryGateway::new()
            .with_versioned_bucket("assets", keys)
            .with_page_size(5);

        empty_bucket(&gateway, "assets").await.unwrap();
        assert_eq!(gateway.version_count("assets"), 24);

        let purged = purge_object_versions(&gateway, "assets").await.unwrap();
        assert_eq!(purged, 24);
        assert_eq!(gateway.version_count("assets"), 0);
        assert_eq!(gateway.call_count(GatewayOp::ListObjectVersions), 5);
        gateway.delete_bucket("assets").await.unwrap();
    }

    #[tokio::test]
    async fn test_folder_marker() {
        let gateway = InMemoryGateway::new().with_bucket("assets", Vec::new());

        let key = create_folder_marker(&gateway, "assets", "/images/2024/")
            .await
            .unwrap();

        assert_eq!(key, "images/2024/");
        assert!(gateway.has_object("assets", "images/2024/"));
    }

    #[tokio::test]
    async fn test_move_object() {
        let gateway = InMemoryGateway::new().with_bucket("assets", vec!["a.txt".into()]);

        let outcome = move_object(&gateway, "assets", "a.txt", "docs/a.txt")
            .await
            .unwrap();

        assert_eq!(outcome, MoveOutcome::Moved);
        assert!(!gateway.has_object("assets", "a.txt"));
        assert!(gateway.has_object("assets", "docs/a.txt"));
    }

    #[tokio::test]
    async fn test_move_reports_duplicate_when_delete_fails() {
        let gateway = InMemoryGateway::new().with_bucket("assets", vec!["a.txt".into()]);
        gateway.fail_next(GatewayOp::DeleteObject, ErrorKind::PermissionDenied);

        let outcome = move_object(&gateway, "assets", "a.txt", "b.txt").await.unwrap();

        match outcome {
            MoveOutcome::Duplicated { source_error } => {
                assert_eq!(source_error.kind, ErrorKind::PermissionDenied);
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert!(gateway.has_object("assets", "a.txt"));
        assert!(gateway.has_object("assets", "b.txt"));
    }

    #[tokio::test]
    async fn test_move_fails_cleanly_when_copy_fails() {
        let gateway = InMemoryGateway::new().with_bucket("assets", vec!["a.txt".into()]);

        let err = move_object(&gateway, "assets", "missing.txt", "b.txt")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!gateway.has_object("assets", "b.txt"));
    }
}
