//! Suites against a real `openssl s_server`. Run with `cargo test -- --ignored` on a machine
//! with the `openssl` binary on its path.

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use prober::cli::{run_batch, RunConfig, Target};
use test_log::test;
use tlsprober::conversations::{
    extended_master_secret_suite, fuzz_mac_suite, fuzz_padding_suite, sanity_suite, tls13_suite,
};

struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn asset(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("assets")
        .join(name)
}

fn s_server(extra: &[&str]) -> Server {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let child = Command::new("openssl")
        .arg("s_server")
        .arg("-www")
        .arg("-quiet")
        .args(["-accept", &port.to_string()])
        .arg("-cert")
        .arg(asset("rsa-cert.pem"))
        .arg("-key")
        .arg(asset("rsa-key.pem"))
        .args(extra)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("openssl is not installed");

    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return Server { child, port };
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("s_server did not come up on port {}", port);
}

fn config(server: &Server) -> RunConfig {
    RunConfig {
        target: Target {
            host: "127.0.0.1".into(),
            port: server.port,
            timeout: Duration::from_secs(5),
        },
        ..RunConfig::default()
    }
}

#[test]
#[ignore]
fn test_sanity_suite() {
    let server = s_server(&["-cipher", "ALL:@SECLEVEL=0"]);
    let config = config(&server);
    let report = run_batch(&sanity_suite(&config.target).unwrap(), &config).unwrap();
    assert!(report.all_passed(), "{}", report.summary());
}

#[test]
#[ignore]
fn test_fuzz_mac_suite() {
    let server = s_server(&["-cipher", "ALL:@SECLEVEL=0"]);
    let config = RunConfig {
        sample: Some(20),
        ..config(&server)
    };
    let report = run_batch(&fuzz_mac_suite(&config.target).unwrap(), &config).unwrap();
    assert!(report.all_passed(), "{}", report.summary());
}

#[test]
#[ignore]
fn test_fuzz_padding_suite() {
    let server = s_server(&["-cipher", "ALL:@SECLEVEL=0"]);
    let config = config(&server);
    let report = run_batch(&fuzz_padding_suite(&config.target).unwrap(), &config).unwrap();
    assert!(report.all_passed(), "{}", report.summary());
}

#[test]
#[ignore]
fn test_extended_master_secret_suite() {
    let server = s_server(&["-cipher", "ALL:@SECLEVEL=0"]);
    let config = config(&server);
    let report =
        run_batch(&extended_master_secret_suite(&config.target).unwrap(), &config).unwrap();
    assert!(report.sanity_ok, "{}", report.summary());
}

#[test]
#[ignore]
fn test_tls13_suite() {
    let server = s_server(&["-tls1_3"]);
    let config = RunConfig {
        sample: Some(10),
        ..config(&server)
    };
    let report = run_batch(&tls13_suite(&config.target).unwrap(), &config).unwrap();
    assert!(report.all_passed(), "{}", report.summary());
}
