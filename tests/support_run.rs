use std::ffi::OsStr;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub struct ServerHandle {
    shutdown: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _send_result = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            drop(handle.join());
        }
    }
}

/// Spawn a stub inference endpoint that answers every call with `200 OK`.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_endpoint() -> Result<(String, ServerHandle), String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind stub endpoint failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("stub addr failed: {}", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("set_nonblocking failed: {}", err))?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match listener.accept() {
                Ok((stream, _)) => {
                    thread::spawn(move || handle_client(stream));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });

    Ok((
        format!("http://{}/invocations", addr),
        ServerHandle {
            shutdown: shutdown_tx,
            thread: Some(handle),
        },
    ))
}

/// Like [`spawn_endpoint`], but skips when the sandbox forbids sockets.
///
/// # Errors
///
/// Returns an error for any bind failure other than a permission denial.
pub fn spawn_endpoint_or_skip() -> Result<Option<(String, ServerHandle)>, String> {
    match spawn_endpoint() {
        Ok(result) => Ok(Some(result)),
        Err(err) if err.contains("Operation not permitted") => {
            eprintln!("Skipping e2e test: {}", err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn handle_client(mut stream: TcpStream) {
    if stream.set_nonblocking(false).is_err() {
        return;
    }
    let mut raw = Vec::new();
    let mut buffer = [0u8; 1024];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                raw.extend_from_slice(buffer.get(..read).unwrap_or_default());
                if request_complete(&raw) {
                    break;
                }
            }
        }
    }
    if stream
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK")
        .is_err()
    {
        return;
    }
    if stream.flush().is_err() {
        return;
    }
    drop(stream.shutdown(Shutdown::Both));
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    body.len() >= length
}

/// Run the `inferload` binary and capture output.
///
/// # Errors
///
/// Returns an error if the binary cannot be executed.
pub fn run_inferload<I, S>(args: I) -> Result<Output, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = inferload_bin()?;
    Command::new(bin)
        .args(args)
        .env("INFERLOAD_LOG", "error")
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .env_remove("AWS_SESSION_TOKEN")
        .env("NO_PROXY", "127.0.0.1,localhost")
        .output()
        .map_err(|err| format!("run inferload failed: {}", err))
}

/// Start `inferload serve` in the background.
///
/// # Errors
///
/// Returns an error if the binary cannot be started.
pub fn spawn_inferload<I, S>(args: I) -> Result<Child, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = inferload_bin()?;
    Command::new(bin)
        .args(args)
        .env("INFERLOAD_LOG", "error")
        .env_remove("INFERLOAD_AUTH_TOKEN")
        .env("NO_PROXY", "127.0.0.1,localhost")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| format!("spawn inferload failed: {}", err))
}

/// Reserve a loopback port by binding and releasing it.
///
/// # Errors
///
/// Returns an error if no port can be bound.
pub fn free_port() -> Result<u16, String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind probe failed: {}", err))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|err| format!("probe addr failed: {}", err))
}

/// Parse JSON-line events from captured stdout.
///
/// # Errors
///
/// Returns an error if a line is not valid JSON.
pub fn json_lines(stdout: &[u8]) -> Result<Vec<serde_json::Value>, String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|err| format!("bad event '{}': {}", line, err)))
        .collect()
}

pub fn status_of(event: &serde_json::Value) -> Option<&str> {
    event.get("status").and_then(serde_json::Value::as_str)
}

fn inferload_bin() -> Result<String, String> {
    option_env!("CARGO_BIN_EXE_inferload").map_or_else(
        || Err("CARGO_BIN_EXE_inferload missing at compile time.".to_owned()),
        |path| Ok(path.to_owned()),
    )
}
