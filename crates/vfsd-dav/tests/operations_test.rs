mod common;

use common::{header, mounted, multistatus, Entry, Reply};
use parking_lot::Mutex;
use std::io::SeekFrom;
use std::sync::Arc;
use vfsd_backend::{
    AttributeMatcher, CopyFlags, Enumerate, FileType, JobContext, Mutate, OpenRead, OpenWrite,
    Push, QueryInfo, QueryInfoFlags, ReplaceOptions, VfsError,
};
use vfsd_dav::transport::RequestBody;
use vfsd_dav::{HttpRequest, Method};

fn stat_reply(entries: &[Entry]) -> Reply {
    Reply::multistatus(multistatus(entries))
}

fn depth(request: &HttpRequest) -> Option<&str> {
    header(request, "Depth")
}

#[tokio::test]
async fn enumerate_skips_the_directory_itself() {
    let (backend, transport, job) = mounted(|request| match (request.method, request.url.path()) {
        (Method::Propfind, "/docs/") => stat_reply(&[
            Entry::file("/docs/notes.txt", 12),
            Entry::dir("/docs/"),
            Entry::dir("/docs/archive/"),
        ]),
        _ => Reply::new(404),
    })
    .await;

    let entries = backend
        .enumerate(&job, "/docs", QueryInfoFlags::default(), &AttributeMatcher::all())
        .await
        .unwrap();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["notes.txt", "archive"]);
    assert_eq!(entries[0].size, Some(12));
    assert_eq!(entries[1].file_type, FileType::Directory);
    assert_eq!(entries[1].size, None);

    let propfind = transport.last(Method::Propfind).unwrap();
    assert_eq!(propfind.header("Depth"), Some("1"));
    assert!(propfind.body.unwrap().starts_with(b"<?xml"));
}

#[tokio::test]
async fn enumerate_of_a_file_fails() {
    let (backend, _transport, job) = mounted(|request| match request.method {
        Method::Propfind => stat_reply(&[Entry::file("/notes.txt/", 3)]),
        _ => Reply::new(404),
    })
    .await;

    let err = backend
        .enumerate(&job, "/notes.txt", QueryInfoFlags::default(), &AttributeMatcher::all())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::NotDirectory(_)));
}

#[tokio::test]
async fn query_info_maps_properties() {
    let (backend, transport, job) = mounted(|request| match (request.method, request.url.path()) {
        (Method::Propfind, "/report.pdf") => stat_reply(&[Entry::file("/report.pdf", 2048)
            .etag("\"v7\"")
            .prop("<D:getcontenttype>application/pdf</D:getcontenttype>")
            .prop("<D:getlastmodified>Tue, 15 Nov 1994 12:45:26 GMT</D:getlastmodified>")]),
        _ => Reply::new(404),
    })
    .await;

    let info = backend
        .query_info(
            &job,
            "/report.pdf",
            QueryInfoFlags::default(),
            &AttributeMatcher::all(),
        )
        .await
        .unwrap();
    assert_eq!(info.name, "report.pdf");
    assert_eq!(info.file_type, FileType::Regular);
    assert_eq!(info.size, Some(2048));
    assert_eq!(info.etag.as_deref(), Some("\"v7\""));
    assert_eq!(info.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(info.modified.unwrap().to_rfc3339(), "1994-11-15T12:45:26+00:00");

    let propfind = transport.last(Method::Propfind).unwrap();
    assert_eq!(propfind.header("Depth"), Some("0"));
    assert_eq!(propfind.header("Apply-To-Redirect-Ref"), Some("T"));

    let err = backend
        .query_info(&job, "/gone", QueryInfoFlags::default(), &AttributeMatcher::all())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn query_info_without_target_is_invalid() {
    let (backend, _transport, job) = mounted(|request| match request.method {
        Method::Propfind => stat_reply(&[Entry::file("/elsewhere", 1)]),
        _ => Reply::new(404),
    })
    .await;

    let err = backend
        .query_info(&job, "/file", QueryInfoFlags::default(), &AttributeMatcher::all())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Failed(ref msg) if msg == "Response invalid"));
}

#[tokio::test]
async fn fs_info_reports_quota() {
    let (backend, transport, job) = mounted(|request| {
        if request.method == Method::Propfind && depth(request) == Some("0") {
            return stat_reply(&[Entry::dir("/").prop(
                "<D:quota-available-bytes>700</D:quota-available-bytes>\
                 <D:quota-used-bytes>300</D:quota-used-bytes>",
            )]);
        }
        Reply::new(404)
    })
    .await;

    let fs = backend
        .query_fs_info(&job, "/", &AttributeMatcher::new("filesystem::*"))
        .await
        .unwrap();
    assert_eq!(fs.fs_type, "webdav");
    assert!(fs.remote);
    assert_eq!(fs.free, Some(700));
    assert_eq!(fs.used, Some(300));
    assert_eq!(fs.size, Some(1000));
    assert_eq!(transport.count(Method::Propfind), 1);

    let fs = backend
        .query_fs_info(&job, "/", &AttributeMatcher::new("standard::name"))
        .await
        .unwrap();
    assert_eq!(fs.size, None);
    assert_eq!(transport.count(Method::Propfind), 1);
}

#[tokio::test]
async fn create_buffers_until_close() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Head => Reply::new(404),
        Method::Put => Reply::new(201),
        _ => Reply::new(500),
    })
    .await;

    let mut handle = backend.create(&job, "/new.txt").await.unwrap();
    assert_eq!(handle.write(&job, b"hello ").await.unwrap(), 6);
    assert_eq!(handle.write(&job, b"world").await.unwrap(), 5);
    assert_eq!(transport.count(Method::Put), 0);

    let info = handle
        .query_info(&job, &AttributeMatcher::all())
        .await
        .unwrap();
    assert_eq!(info.size, Some(11));
    assert_eq!(info.content_type.as_deref(), Some("text/plain"));

    handle.close(&job).await.unwrap();
    let put = transport.last(Method::Put).unwrap();
    assert_eq!(put.path, "/new.txt");
    assert_eq!(put.body.as_deref(), Some(&b"hello world"[..]));
    assert_eq!(put.header("If-Match"), None);
}

#[tokio::test]
async fn create_over_existing_file_fails() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Head => Reply::new(200),
        _ => Reply::new(500),
    })
    .await;

    let err = backend.create(&job, "/taken.txt").await.err().unwrap();
    assert!(matches!(err, VfsError::Exists(_)));
    assert_eq!(transport.count(Method::Put), 0);
}

#[tokio::test]
async fn replace_with_stale_etag_fails_without_upload() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Head if header(request, "If-Match") == Some("abc") => Reply::new(412),
        Method::Head => Reply::new(200),
        _ => Reply::new(201),
    })
    .await;

    let options = ReplaceOptions {
        etag: Some("abc".to_string()),
        make_backup: false,
    };
    let err = backend.replace(&job, "/doc.txt", &options).await.err().unwrap();
    assert!(matches!(err, VfsError::WrongETag(_)));
    assert_eq!(transport.count(Method::Put), 0);
}

#[tokio::test]
async fn replace_close_detects_concurrent_change() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Head => Reply::new(200),
        Method::Put => Reply::new(412),
        _ => Reply::new(500),
    })
    .await;

    let options = ReplaceOptions {
        etag: Some("abc".to_string()),
        make_backup: false,
    };
    let mut handle = backend.replace(&job, "/doc.txt", &options).await.unwrap();
    handle.write(&job, b"v2").await.unwrap();
    let err = handle.close(&job).await.unwrap_err();

    assert!(matches!(err, VfsError::WrongETag(_)));
    assert_eq!(transport.last(Method::Put).unwrap().header("If-Match"), Some("abc"));
}

#[tokio::test]
async fn replace_refuses_backups() {
    let (backend, transport, job) = mounted(|_| Reply::new(200)).await;

    let options = ReplaceOptions {
        etag: None,
        make_backup: true,
    };
    let err = backend.replace(&job, "/doc.txt", &options).await.err().unwrap();
    assert!(matches!(err, VfsError::CantCreateBackup(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn append_uploads_old_and_new_content() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Get => Reply::new(200).header("ETag", "\"e1\"").body("abc"),
        Method::Put => Reply::new(204),
        _ => Reply::new(500),
    })
    .await;

    let mut handle = backend.append_to(&job, "/log.txt").await.unwrap();
    handle.write(&job, b"def").await.unwrap();
    handle.seek(&job, SeekFrom::Start(0)).await.unwrap();
    handle.write(&job, b"A").await.unwrap();
    handle.close(&job).await.unwrap();

    let put = transport.last(Method::Put).unwrap();
    assert_eq!(put.body.as_deref(), Some(&b"Abcdef"[..]));
    assert_eq!(put.header("If-Match"), Some("\"e1\""));
}

#[tokio::test]
async fn truncate_shrinks_and_zero_fills() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Head => Reply::new(404),
        Method::Put => Reply::new(201),
        _ => Reply::new(500),
    })
    .await;

    let mut handle = backend.create(&job, "/data.bin").await.unwrap();
    handle.write(&job, b"abcdef").await.unwrap();
    handle.truncate(&job, 2).await.unwrap();
    handle.seek(&job, SeekFrom::Start(4)).await.unwrap();
    handle.write(&job, b"z").await.unwrap();
    handle.close(&job).await.unwrap();

    let put = transport.last(Method::Put).unwrap();
    assert_eq!(put.body.as_deref(), Some(&b"ab\0\0z"[..]));
}

#[tokio::test]
async fn close_without_answer_keeps_content_for_retry() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Head => Reply::new(404),
        Method::Put => Reply::new(201),
        _ => Reply::new(500),
    })
    .await;

    let mut handle = backend.create(&job, "/draft.txt").await.unwrap();
    handle.write(&job, b"draft").await.unwrap();

    let cancelled = JobContext::new();
    cancelled.cancel();
    let err = handle.close(&cancelled).await.unwrap_err();
    assert!(matches!(err, VfsError::Cancelled));
    assert_eq!(transport.count(Method::Put), 0);

    handle.close(&job).await.unwrap();
    let puts: Vec<_> = transport
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Put)
        .collect();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body.as_deref(), Some(&b"draft"[..]));
}

#[tokio::test]
async fn write_beyond_addressable_size_fails() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Head => Reply::new(404),
        _ => Reply::new(500),
    })
    .await;

    let mut handle = backend.create(&job, "/huge.bin").await.unwrap();
    handle.seek(&job, SeekFrom::Start(u64::MAX - 1)).await.unwrap();
    let err = handle.write(&job, b"abc").await.unwrap_err();
    assert!(matches!(
        err,
        VfsError::InvalidArgument(_) | VfsError::NoSpace(_)
    ));

    handle
        .seek(&job, SeekFrom::Start(isize::MAX as u64))
        .await
        .unwrap();
    let err = handle.write(&job, b"a").await.unwrap_err();
    assert!(matches!(
        err,
        VfsError::InvalidArgument(_) | VfsError::NoSpace(_)
    ));

    let info = handle
        .query_info(&job, &AttributeMatcher::all())
        .await
        .unwrap();
    assert_eq!(info.size, Some(0));
    assert_eq!(transport.count(Method::Put), 0);
}

#[tokio::test]
async fn read_streams_and_seeks_with_ranges() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Propfind => stat_reply(&[Entry::file("/digits.txt", 10)]),
        Method::Get => match header(request, "Range") {
            Some("bytes=8-") => Reply::new(206)
                .header("Content-Range", "bytes 8-9/10")
                .body("89"),
            Some(_) => Reply::new(416),
            None => Reply::new(200).body("0123456789"),
        },
        _ => Reply::new(404),
    })
    .await;

    let mut handle = backend.open_for_read(&job, "/digits.txt").await.unwrap();
    assert_eq!(&handle.read(&job, 4).await.unwrap()[..], b"0123");
    assert_eq!(&handle.read(&job, 2).await.unwrap()[..], b"45");

    assert_eq!(handle.seek(&job, SeekFrom::End(-2)).await.unwrap(), 8);
    assert_eq!(&handle.read(&job, 4).await.unwrap()[..], b"89");
    assert!(handle.read(&job, 4).await.unwrap().is_empty());
    handle.close(&job).await.unwrap();

    let ranges: Vec<Option<String>> = transport
        .requests()
        .iter()
        .filter(|r| r.method == Method::Get)
        .map(|r| r.header("Range").map(str::to_string))
        .collect();
    assert_eq!(ranges, vec![None, Some("bytes=8-".to_string())]);
}

#[tokio::test]
async fn read_seek_on_server_without_ranges_fails() {
    let (backend, _transport, job) = mounted(|request| match request.method {
        Method::Propfind => stat_reply(&[Entry::file("/digits.txt", 10)]),
        Method::Get => Reply::new(200).body("0123456789"),
        _ => Reply::new(404),
    })
    .await;

    let mut handle = backend.open_for_read(&job, "/digits.txt").await.unwrap();
    handle.seek(&job, SeekFrom::Start(5)).await.unwrap();
    let err = handle.read(&job, 1).await.unwrap_err();
    assert!(matches!(err, VfsError::NotSupported(ref msg) if msg == "Error seeking in stream"));
}

#[tokio::test]
async fn open_directory_for_read_fails() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Propfind => stat_reply(&[Entry::dir("/docs/")]),
        _ => Reply::new(200),
    })
    .await;

    let err = backend.open_for_read(&job, "/docs").await.err().unwrap();
    assert!(matches!(err, VfsError::IsDirectory(_)));
    assert_eq!(transport.count(Method::Get), 0);
}

#[tokio::test]
async fn make_directory_maps_statuses() {
    let (backend, transport, job) = mounted(|request| match request.url.path() {
        "/new/" => Reply::new(201),
        "/exists/" => Reply::new(405),
        _ => Reply::new(409),
    })
    .await;

    backend.make_directory(&job, "/new").await.unwrap();
    assert_eq!(transport.last(Method::Mkcol).unwrap().path, "/new/");

    let err = backend.make_directory(&job, "/exists").await.unwrap_err();
    assert!(matches!(err, VfsError::Exists(_)));

    let err = backend
        .make_directory(&job, "/missing/child")
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::NotFound(_)));
}

#[tokio::test]
async fn delete_of_non_empty_directory_is_refused() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Propfind => stat_reply(&[Entry::dir("/folder/"), Entry::file("/folder/a.txt", 1)]),
        _ => Reply::new(204),
    })
    .await;

    let err = backend.delete(&job, "/folder").await.unwrap_err();
    assert!(matches!(err, VfsError::NotEmpty(_)));
    assert_eq!(transport.count(Method::Delete), 0);
    assert_eq!(transport.last(Method::Propfind).unwrap().header("Depth"), Some("1"));
}

#[tokio::test]
async fn delete_empty_directory_and_file() {
    let (backend, transport, job) = mounted(|request| match (request.method, request.url.path()) {
        (Method::Propfind, "/empty") => stat_reply(&[Entry::dir("/empty/")]),
        (Method::Propfind, "/file.txt") => stat_reply(&[Entry::file("/file.txt", 4)]),
        (Method::Delete, _) => Reply::new(204),
        _ => Reply::new(404),
    })
    .await;

    backend.delete(&job, "/empty").await.unwrap();
    assert_eq!(transport.last(Method::Delete).unwrap().path, "/empty/");

    backend.delete(&job, "/file.txt").await.unwrap();
    assert_eq!(transport.last(Method::Delete).unwrap().path, "/file.txt");

    let err = backend.delete(&job, "/nope").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn set_display_name_moves_within_parent() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Move if header(request, "Destination").unwrap().ends_with("/taken.txt") => {
            Reply::new(412)
        }
        Method::Move => Reply::new(201),
        _ => Reply::new(404),
    })
    .await;

    let new_path = backend
        .set_display_name(&job, "/docs/draft.txt", "final.txt")
        .await
        .unwrap();
    assert_eq!(new_path, "/docs/final.txt");
    let request = transport.last(Method::Move).unwrap();
    assert_eq!(request.path, "/docs/draft.txt");
    assert_eq!(
        request.header("Destination"),
        Some("https://dav.example.test/docs/final.txt")
    );
    assert_eq!(request.header("Overwrite"), Some("F"));

    let err = backend
        .set_display_name(&job, "/docs/draft.txt", "taken.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Exists(_)));

    let err = backend
        .set_display_name(&job, "/docs/draft.txt", "a/b")
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::InvalidArgument(_)));
}

#[tokio::test]
async fn move_file_over_directory_is_refused() {
    let (backend, transport, job) = mounted(|request| match (request.method, request.url.path()) {
        (Method::Propfind, "/b") => stat_reply(&[Entry::dir("/b/")]),
        (Method::Propfind, "/a") => stat_reply(&[Entry::file("/a", 5)]),
        _ => Reply::new(201),
    })
    .await;

    let err = backend
        .move_to(&job, "/a", "/b", CopyFlags::overwrite())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::IsDirectory(ref msg) if msg == "Can't move over directory"));
    assert_eq!(transport.count(Method::Move), 0);
}

#[tokio::test]
async fn move_policy_matrix() {
    let (backend, transport, job) = mounted(|request| match (request.method, request.url.path()) {
        (Method::Propfind, "/dir1") | (Method::Propfind, "/dir2") => {
            stat_reply(&[Entry::dir(request.url.path())])
        }
        (Method::Propfind, "/f1") | (Method::Propfind, "/f2") => {
            stat_reply(&[Entry::file(request.url.path(), 7)])
        }
        (Method::Propfind, _) => Reply::new(404),
        (Method::Move, _) | (Method::Delete, _) => Reply::new(204),
        _ => Reply::new(500),
    })
    .await;

    let err = backend
        .move_to(&job, "/f1", "/f2", CopyFlags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Exists(_)));

    let err = backend
        .move_to(&job, "/dir1", "/dir2", CopyFlags::overwrite())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::WouldMerge(_)));
    assert_eq!(transport.count(Method::Move), 0);

    backend
        .move_to(&job, "/dir1", "/f2", CopyFlags::overwrite())
        .await
        .unwrap();
    assert_eq!(transport.last(Method::Delete).unwrap().path, "/f2");
    let request = transport.last(Method::Move).unwrap();
    assert_eq!(request.path, "/dir1");
    assert_eq!(request.header("Overwrite"), Some("T"));

    transport.clear();
    backend
        .move_to(&job, "/f1", "/fresh", CopyFlags::default())
        .await
        .unwrap();
    assert_eq!(transport.count(Method::Delete), 0);
    let request = transport.last(Method::Move).unwrap();
    assert_eq!(
        request.header("Destination"),
        Some("https://dav.example.test/fresh")
    );
    assert_eq!(request.header("Overwrite"), Some("F"));

    let err = backend
        .move_to(
            &job,
            "/f1",
            "/fresh",
            CopyFlags {
                backup: true,
                ..CopyFlags::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::NotSupported(_)));
}

#[tokio::test]
async fn move_redirected_destination_means_exists() {
    let (backend, _transport, job) = mounted(|request| match request.method {
        Method::Propfind => Reply::new(404),
        Method::Move => Reply::redirect(301, "https://dav.example.test/elsewhere"),
        _ => Reply::new(500),
    })
    .await;

    let err = backend
        .move_to(&job, "/a", "/b", CopyFlags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Exists(_)));
}

#[tokio::test]
async fn copy_refuses_directories_and_reports_progress() {
    let (backend, transport, job) = mounted(|request| match (request.method, request.url.path()) {
        (Method::Propfind, "/dir") => stat_reply(&[Entry::dir("/dir/")]),
        (Method::Propfind, "/file.txt") => stat_reply(&[Entry::file("/file.txt", 42)]),
        (Method::Propfind, _) => Reply::new(404),
        (Method::Copy, _) => Reply::new(201),
        _ => Reply::new(500),
    })
    .await;

    let err = backend
        .copy(&job, "/dir", "/dir-copy", CopyFlags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::WouldRecurse(_)));
    assert_eq!(transport.count(Method::Copy), 0);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = progress.clone();
    let job = job.with_progress(Arc::new(move |done: u64, total: u64| {
        seen.lock().push((done, total))
    }));
    backend
        .copy(&job, "/file.txt", "/copy.txt", CopyFlags::default())
        .await
        .unwrap();
    let request = transport.last(Method::Copy).unwrap();
    assert_eq!(
        request.header("Destination"),
        Some("https://dav.example.test/copy.txt")
    );
    assert_eq!(*progress.lock(), vec![(42, 42)]);
}

#[tokio::test]
async fn push_uploads_local_file() {
    let (backend, transport, job) = mounted(|request| match request.method {
        Method::Propfind => Reply::new(404),
        Method::Put => Reply::new(201),
        _ => Reply::new(500),
    })
    .await;

    let dir = tempfile::TempDir::new().unwrap();
    let local = dir.path().join("upload.bin");
    std::fs::write(&local, b"payload").unwrap();

    backend
        .push(&job, "/upload.bin", &local, CopyFlags::default(), true)
        .await
        .unwrap();

    let put = transport.last(Method::Put).unwrap();
    assert_eq!(put.path, "/upload.bin");
    assert_eq!(put.file_length, Some(7));
    assert!(!local.exists());
}

/// Rewrites the uploaded local file to `len` bytes while its PUT is in flight.
fn resize_during_put(len: usize) -> impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static {
    move |request| match (request.method, &request.body) {
        (Method::Propfind, _) => Reply::new(404),
        (Method::Put, RequestBody::File { path, .. }) => {
            std::fs::write(path, vec![b'x'; len]).unwrap();
            Reply::new(201)
        }
        _ => Reply::new(500),
    }
}

#[tokio::test]
async fn push_fails_when_local_file_changes_length() {
    let dir = tempfile::TempDir::new().unwrap();
    let local = dir.path().join("growing.log");

    for len in [28, 2] {
        let (backend, transport, job) = mounted(resize_during_put(len)).await;
        std::fs::write(&local, b"start").unwrap();

        let err = backend
            .push(&job, "/growing.log", &local, CopyFlags::default(), true)
            .await
            .unwrap_err();
        assert!(
            matches!(err, VfsError::Failed(ref msg) if msg == "File length changed during transfer")
        );
        assert_eq!(transport.last(Method::Put).unwrap().file_length, Some(5));
        assert!(local.exists());
    }
}

#[tokio::test]
async fn push_checks_destination_first() {
    let (backend, transport, job) = mounted(|request| match (request.method, request.url.path()) {
        (Method::Propfind, "/dir") => stat_reply(&[Entry::dir("/dir/")]),
        (Method::Propfind, _) => stat_reply(&[Entry::file(request.url.path(), 1)]),
        _ => Reply::new(201),
    })
    .await;

    let dir = tempfile::TempDir::new().unwrap();
    let local = dir.path().join("upload.bin");
    std::fs::write(&local, b"payload").unwrap();

    let err = backend
        .push(&job, "/taken.bin", &local, CopyFlags::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Exists(_)));

    let err = backend
        .push(&job, "/dir", &local, CopyFlags::overwrite(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::IsDirectory(_)));

    let err = backend
        .push(&job, "/x", dir.path(), CopyFlags::overwrite(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::NotSupported(_)));
    assert_eq!(transport.count(Method::Put), 0);
    assert!(local.exists());
}

#[tokio::test]
async fn cancelled_job_sends_nothing_further() {
    let (backend, _transport, _job) = mounted(|_| Reply::new(200)).await;

    let job = JobContext::new();
    job.cancel();
    let err = backend.make_directory(&job, "/late").await.unwrap_err();
    assert!(matches!(err, VfsError::Cancelled));
}

#[tokio::test]
async fn operations_before_mount_fail() {
    let transport = common::MockTransport::new(|_| Reply::new(200));
    let backend = common::backend(transport.clone());
    let job = JobContext::new();

    let err = backend.delete(&job, "/x").await.unwrap_err();
    assert!(matches!(err, VfsError::Failed(_)));
    assert!(transport.requests().is_empty());
}
