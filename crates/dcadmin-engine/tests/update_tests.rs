// Self-update against a one-shot local HTTP server

use dcadmin_core::errors::ExErrorKind;
use dcadmin_engine::commands::update::{
    apply_binary_with, fetch_binary, install_from, sha256_hex, Renamer,
};
use std::cell::Cell;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

const NEW_BINARY: &[u8] = b"#!/bin/sh\necho new\n";

/// Serve exactly one request with the given status line and body, returning
/// the base URL and the request line the client sent
fn serve_once(status: &'static str, body: &'static [u8]) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).unwrap();
            if header == "\r\n" || header.is_empty() {
                break;
            }
        }
        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        )
        .unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();
        request_line
    });

    (base, handle)
}

#[test]
fn test_install_replaces_binary() {
    let (base, server) = serve_once("200 OK", NEW_BINARY);
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("dcadmin");
    fs::write(&target, b"old").unwrap();

    let url = format!("{}/2.9.1/linux_amd64/sourcegraph-server-gen", base);
    let outcome = install_from(&url, Some("2.9.1"), &target).unwrap();

    assert_eq!(fs::read(&target).unwrap(), NEW_BINARY);
    assert_eq!(outcome.bytes, NEW_BINARY.len());
    assert_eq!(outcome.sha256, sha256_hex(NEW_BINARY));
    assert_eq!(outcome.installed_at, target);
    assert!(server
        .join()
        .unwrap()
        .starts_with("GET /2.9.1/linux_amd64/sourcegraph-server-gen "));
}

#[test]
fn test_missing_version_reports_status() {
    let (base, server) = serve_once("404 Not Found", b"");
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("dcadmin");
    fs::write(&target, b"old").unwrap();

    let url = format!("{}/9.9.9/linux_amd64/sourcegraph-server-gen", base);
    let err = install_from(&url, Some("9.9.9"), &target).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::UpdateNotFound);
    assert_eq!(
        err.message(),
        "Version 9.9.9 was not found. Status code was 404."
    );
    assert_eq!(fs::read(&target).unwrap(), b"old");
    server.join().unwrap();
}

#[test]
fn test_unreachable_host_is_http_error() {
    let port = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let err = fetch_binary(&format!("http://127.0.0.1:{}/x", port), None).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Http);
}

/// Performs real renames except for the numbered calls (1-based) it is told
/// to fail
struct FlakyRenamer {
    calls: Cell<usize>,
    fail_on: &'static [usize],
}

impl FlakyRenamer {
    fn failing(fail_on: &'static [usize]) -> Self {
        Self {
            calls: Cell::new(0),
            fail_on,
        }
    }
}

impl Renamer for FlakyRenamer {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.fail_on.contains(&call) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("rename #{} refused", call),
            ));
        }
        fs::rename(from, to)
    }
}

#[test]
fn test_failed_swap_puts_old_binary_back() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("sourcegraph-server-gen");
    fs::write(&target, b"old binary").unwrap();
    let renamer = FlakyRenamer::failing(&[2]);

    let err = apply_binary_with(&renamer, &target, NEW_BINARY).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::UpdateApply);
    assert!(err.message().contains("could not move new binary into place"));
    assert_eq!(renamer.calls.get(), 3);
    assert_eq!(fs::read(&target).unwrap(), b"old binary");
    assert!(!temp_dir.path().join(".sourcegraph-server-gen.new").exists());
    assert!(!temp_dir.path().join(".sourcegraph-server-gen.old").exists());
}

#[test]
fn test_failed_rollback_is_reported_with_swap_error() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("sourcegraph-server-gen");
    fs::write(&target, b"old binary").unwrap();
    let renamer = FlakyRenamer::failing(&[2, 3]);

    let err = apply_binary_with(&renamer, &target, NEW_BINARY).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::RollbackFailed);
    assert!(err.message().contains("failed to rollback from bad update"));
    assert!(err.message().contains("rename #3 refused"));
    let swap = err.source_error().unwrap();
    assert_eq!(swap.kind(), ExErrorKind::UpdateApply);
    assert!(swap.message().contains("could not move new binary into place"));
    assert!(swap.to_string().contains("rename #2 refused"));
    assert_eq!(
        fs::read(temp_dir.path().join(".sourcegraph-server-gen.old")).unwrap(),
        b"old binary"
    );
}
