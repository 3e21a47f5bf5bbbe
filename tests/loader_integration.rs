//! Loader behavior across threads and the version gate.

#[path = "common/mod.rs"]
mod common;

use common::TextLinker;
use native_serial::host::{HostArch, HostKey, HostOs};
use native_serial::loader::{
    DirectoryResources, EmbeddedResources, ExtractTarget, LoaderError, LoaderPhase,
    NativeLibLoader,
};
use native_serial::version::SemanticVersion;
use std::sync::{Arc, Barrier};
use std::thread;

const HOST: HostKey = HostKey::new(HostOs::Linux, HostArch::X64);
const THREADS: usize = 8;

static ARTIFACTS: &[(&str, &[u8])] = &[
    ("/native/libcurrent.so", b"0.4.2"),
    ("/native/libfloor.so", b"0.1.0"),
    ("/native/libtoo-new.so", b"1.0.0"),
    ("/native/libtagged.so", b"1.0.0-rc1"),
    ("/native/libancient.so", b"0.0.9"),
];

fn gated_loader(dir: &std::path::Path, linker: TextLinker) -> NativeLibLoader<TextLinker> {
    let min = SemanticVersion::release(0, 1, 0);
    let max = SemanticVersion::release(1, 0, 0);
    NativeLibLoader::with_linker(
        EmbeddedResources::new(ARTIFACTS),
        ExtractTarget::Directory(dir.to_path_buf()),
        linker,
    )
    .with_host(HOST)
    .with_compatibility_check(move |ctx| {
        ctx.library
            .trim()
            .parse::<SemanticVersion>()
            .map(|v| v.is_within(&min, &max))
            .unwrap_or(false)
    })
}

fn run_concurrently(loader: &Arc<NativeLibLoader<TextLinker>>) -> Vec<Result<(), LoaderError>> {
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let loader = Arc::clone(loader);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                loader.initialize()
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_initialize_links_once() {
    let tmp = tempfile::tempdir().unwrap();
    let linker = TextLinker::default();
    let loader = Arc::new(gated_loader(tmp.path(), linker.clone()));
    loader.register("linux-x64", "/native/libcurrent.so").unwrap();

    let results = run_concurrently(&loader);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(linker.calls(), 1);
    assert_eq!(loader.libraries().len(), 1);
    assert_eq!(loader.phase(), LoaderPhase::Ready);
}

#[test]
fn test_concurrent_initialize_shares_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let linker = TextLinker::default();
    let loader = Arc::new(gated_loader(tmp.path(), linker.clone()));
    loader.register("linux-x64", "/native/libtoo-new.so").unwrap();

    let results = run_concurrently(&loader);
    // Whoever ran the check, every caller sees the same error.
    for result in &results {
        match result {
            Err(LoaderError::Incompatible { host, path }) => {
                assert_eq!(host, "linux-x64");
                assert!(path.ends_with("native/libtoo-new.so"));
            }
            other => panic!("expected incompatible library, got {other:?}"),
        }
    }
    assert_eq!(linker.calls(), 1);
    assert!(matches!(
        loader.initialize(),
        Err(LoaderError::Incompatible { .. })
    ));
}

#[test]
fn test_version_gate_bounds() {
    for (artifact, accepted) in [
        ("/native/libfloor.so", true),
        ("/native/libcurrent.so", true),
        ("/native/libtoo-new.so", false),
        ("/native/libtagged.so", false),
        ("/native/libancient.so", false),
    ] {
        let tmp = tempfile::tempdir().unwrap();
        let loader = gated_loader(tmp.path(), TextLinker::default());
        loader.register("linux-x64", artifact).unwrap();

        assert_eq!(loader.initialize().is_ok(), accepted, "{artifact}");
        // The file is extracted whether or not the library is accepted.
        assert!(tmp.path().join(artifact.trim_start_matches('/')).is_file());
    }
}

#[test]
fn test_rejected_library_error_names_host_and_path() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = gated_loader(tmp.path(), TextLinker::default());
    loader.register("linux-x64", "/native/libancient.so").unwrap();

    match loader.initialize() {
        Err(LoaderError::Incompatible { host, path }) => {
            assert_eq!(host, "linux-x64");
            assert!(path.ends_with("native/libancient.so"));
        }
        other => panic!("expected incompatible library, got {other:?}"),
    }
}

#[test]
fn test_extraction_reuses_existing_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let first = TextLinker::default();
    gated_loader(tmp.path(), first)
        .register("linux-x64", "/native/libcurrent.so")
        .and_then(|l| l.initialize())
        .unwrap();

    // A later run against the same directory keeps the extracted file.
    let path = tmp.path().join("native/libcurrent.so");
    std::fs::write(&path, "0.5.0").unwrap();
    let second = gated_loader(tmp.path(), TextLinker::default());
    second.register("linux-x64", "/native/libcurrent.so").unwrap();
    second.initialize().unwrap();
    assert_eq!(&*second.libraries()[0].library, "0.5.0");
}

#[test]
fn test_directory_resources_feed_extraction() {
    let src = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(src.path().join("native/aux")).unwrap();
    std::fs::write(src.path().join("native/aux/libdriver.so"), "0.9.9").unwrap();

    let out = tempfile::tempdir().unwrap();
    let loader = NativeLibLoader::with_linker(
        DirectoryResources::new(src.path()),
        ExtractTarget::Directory(out.path().join("deep/dir")),
        TextLinker::default(),
    )
    .with_host(HOST);
    loader.register("linux-x64", "/native/aux/libdriver.so").unwrap();
    loader.initialize().unwrap();

    assert!(out.path().join("deep/dir/native/aux/libdriver.so").is_file());
    assert_eq!(loader.output_dir(), Some(out.path().join("deep/dir")));
}

#[test]
fn test_output_dir_blocked_by_file() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocked");
    std::fs::write(&blocker, b"not a dir").unwrap();

    let loader = NativeLibLoader::with_linker(
        EmbeddedResources::new(ARTIFACTS),
        ExtractTarget::Directory(blocker),
        TextLinker::default(),
    )
    .with_host(HOST);
    loader.register("linux-x64", "/native/libcurrent.so").unwrap();
    assert!(matches!(loader.initialize(), Err(LoaderError::Io { .. })));
}
