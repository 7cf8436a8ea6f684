use std::ffi::OsStr;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

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

/// Kills the child on drop so a failed assertion never leaks an agent.
pub struct ChildGuard(pub Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

/// Spawn a lightweight HTTP target for the agent. Returns its port.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_target_server() -> Result<(u16, ServerHandle), String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind test server failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("server addr failed: {}", err))?;
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
        addr.port(),
        ServerHandle {
            shutdown: shutdown_tx,
            thread: Some(handle),
        },
    ))
}

fn handle_client(mut stream: TcpStream) {
    drop(stream.set_nonblocking(false));
    let mut buffer = [0u8; 1024];
    if stream.read(&mut buffer).is_err() {
        return;
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

/// Pick an available local TCP port.
///
/// # Errors
///
/// Returns an error if a local port cannot be allocated.
pub fn pick_port() -> Result<u16, String> {
    TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind port failed: {}", err))?
        .local_addr()
        .map_err(|err| format!("port addr failed: {}", err))
        .map(|addr| addr.port())
}

/// Run the `loadfleet` binary in `dir` and capture output.
///
/// # Errors
///
/// Returns an error if the binary cannot be executed.
pub fn run_loadfleet<I, S>(args: I, dir: &Path) -> Result<Output, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = loadfleet_bin()?;
    Command::new(bin)
        .args(args)
        .current_dir(dir)
        .env("LOADFLEET_LOG", "error")
        .output()
        .map_err(|err| format!("run loadfleet failed: {}", err))
}

/// Spawn the `loadfleet` binary with output discarded.
///
/// # Errors
///
/// Returns an error if the process cannot be started.
pub fn spawn_loadfleet<I, S>(args: I) -> Result<ChildGuard, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = loadfleet_bin()?;
    Command::new(bin)
        .args(args)
        .env("LOADFLEET_LOG", "error")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(ChildGuard)
        .map_err(|err| format!("spawn loadfleet failed: {}", err))
}

/// Minimal HTTP/1.1 GET returning `(status, body)`.
///
/// # Errors
///
/// Returns an error if the exchange fails or the response is malformed.
pub fn http_get(port: u16, path: &str) -> Result<(u16, String), String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .map_err(|err| format!("connect failed: {}", err))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|err| format!("set timeout failed: {}", err))?;
    let request = format!("GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n", path);
    stream
        .write_all(request.as_bytes())
        .map_err(|err| format!("write failed: {}", err))?;
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .map_err(|err| format!("read failed: {}", err))?;

    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| format!("Malformed response: {:?}", response))?;
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| format!("Missing status in {:?}", head))?;
    Ok((status, body.to_owned()))
}

/// Retry `http_get` until `check` accepts the body or `timeout` passes.
///
/// # Errors
///
/// Returns the last failure when the deadline passes.
pub fn wait_for<F>(port: u16, path: &str, timeout: Duration, check: F) -> Result<String, String>
where
    F: Fn(u16, &str) -> bool,
{
    let start = Instant::now();
    let mut last = String::from("no attempt");
    while start.elapsed() < timeout {
        match http_get(port, path) {
            Ok((status, body)) if check(status, &body) => return Ok(body),
            Ok((status, body)) => last = format!("{} {}", status, body),
            Err(err) => last = err,
        }
        thread::sleep(Duration::from_millis(50));
    }
    Err(format!("Timed out waiting on {}: {}", path, last))
}

fn loadfleet_bin() -> Result<String, String> {
    option_env!("CARGO_BIN_EXE_loadfleet").map_or_else(
        || Err("CARGO_BIN_EXE_loadfleet missing at compile time.".to_owned()),
        |path| Ok(path.to_owned()),
    )
}
