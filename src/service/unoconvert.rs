//! Conversion through a running `unoserver` instance.
//!
//! `unoserver` keeps one LibreOffice process listening on a socket; its
//! `unoconvert` client streams a document in on stdin and the converted
//! document out on stdout. This module drives that client as a supervised
//! subprocess:
//!
//! * `connect` checks that something accepts TCP connections on
//!   `host:port`, so an unreachable service surfaces as
//!   [`ServiceError::Connection`] before any process is spawned. The check
//!   socket is closed straight away: unoserver's RPC server handles one
//!   connection at a time and an idle socket would stall the real request.
//! * `convert` spawns `unoconvert --host H --port P --convert-to EXT - -`,
//!   feeds the input on one thread, drains stdout/stderr on two others, and
//!   polls the child until it exits.
//! * The interrupter kills the child. Its pipes close, the drain threads
//!   finish and `convert` returns [`ServiceError::Interrupted`].

use super::{ConversionService, ServiceConnection};
use crate::cancel::Interrupt;
use crate::config::ConnectionParams;
use crate::error::ServiceError;
use crate::format::FormatRegistry;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// stderr fragments that mean unoconvert never reached the server.
const CONNECTION_MARKERS: &[&str] = &[
    "connection refused",
    "failed to connect",
    "couldn't connect",
    "noconnectexception",
    "name or service not known",
];

/// [`ConversionService`] backed by the `unoconvert` client.
#[derive(Debug, Clone)]
pub struct UnoconvertService {
    program: PathBuf,
    leading_args: Vec<OsString>,
    registry: Arc<FormatRegistry>,
    connect_timeout: Duration,
}

impl UnoconvertService {
    /// Use `unoconvert` from `PATH`, validating formats against `registry`.
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self {
            program: PathBuf::from("unoconvert"),
            leading_args: Vec::new(),
            registry,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Run a different client executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments placed before the generated ones, e.g. when `program` is
    /// an interpreter and the client is a script.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Upper bound for the reachability check in `connect`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn check_reachable(&self, params: &ConnectionParams) -> Result<(), ServiceError> {
        let addrs = (params.host(), params.port())
            .to_socket_addrs()
            .map_err(|e| ServiceError::Connection(format!("{params}: {e}")))?;

        let mut last_err: Option<io::Error> = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    let _ = stream.shutdown(std::net::Shutdown::Both);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }

        let detail = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no address resolved".to_string());
        warn!(
            "Error connecting to document conversion service with params {}: {}",
            params, detail
        );
        Err(ServiceError::Connection(format!("{params}: {detail}")))
    }
}

impl ConversionService for UnoconvertService {
    fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn ServiceConnection>, ServiceError> {
        self.check_reachable(params)?;
        Ok(Box::new(UnoconvertConnection {
            service: self.clone(),
            params: params.clone(),
            shared: Arc::new(Shared::default()),
        }))
    }
}

#[derive(Default)]
struct Shared {
    child: Mutex<Option<Child>>,
    interrupted: AtomicBool,
}

impl Shared {
    fn kill_child(&self) {
        let mut slot = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(child) = slot.as_mut() {
            // Already exited is fine.
            let _ = child.kill();
        }
    }
}

struct Killer(Arc<Shared>);

impl Interrupt for Killer {
    fn interrupt(&self) {
        self.0.interrupted.store(true, Ordering::SeqCst);
        self.0.kill_child();
    }
}

/// One attempt's session with unoserver.
pub struct UnoconvertConnection {
    service: UnoconvertService,
    params: ConnectionParams,
    shared: Arc<Shared>,
}

impl UnoconvertConnection {
    fn spawn(&self, target_ext: &str) -> Result<Child, ServiceError> {
        let mut cmd = Command::new(&self.service.program);
        cmd.args(&self.service.leading_args)
            .arg("--host")
            .arg(self.params.host())
            .arg("--port")
            .arg(self.params.port().to_string())
            .arg("--convert-to")
            .arg(target_ext)
            .arg("-")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("spawning {:?}", cmd);
        cmd.spawn().map_err(|e| {
            ServiceError::Generation(format!(
                "spawning {}: {e}",
                self.service.program.display()
            ))
        })
    }

    /// Poll the child until it exits. The child stays in the shared slot so
    /// the interrupter can kill it meanwhile.
    fn wait_child(&self) -> Result<ExitStatus, ServiceError> {
        loop {
            {
                let mut slot = self
                    .shared
                    .child
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let Some(child) = slot.as_mut() else {
                    return Err(ServiceError::Interrupted);
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        slot.take();
                        return Ok(status);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        slot.take();
                        return Err(ServiceError::Generation(format!("try_wait: {e}")));
                    }
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ServiceConnection for UnoconvertConnection {
    fn interrupter(&self) -> Box<dyn Interrupt> {
        Box::new(Killer(Arc::clone(&self.shared)))
    }

    fn convert(
        &mut self,
        input: &mut (dyn Read + Send),
        source_ext: &str,
        output: &mut dyn Write,
        target_ext: &str,
    ) -> Result<(), ServiceError> {
        if self.shared.interrupted.load(Ordering::SeqCst) {
            return Err(ServiceError::Interrupted);
        }
        let registry = &self.service.registry;
        if !registry.contains(source_ext) {
            return Err(ServiceError::Generation(format!(
                "unsupported source format '{source_ext}'"
            )));
        }
        let target = registry.by_extension(target_ext).ok_or_else(|| {
            ServiceError::Generation(format!("unsupported target format '{target_ext}'"))
        })?;

        let mut child = self.spawn(&target.extension)?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self
            .shared
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(child);
        // An interrupt that landed before the child was visible.
        if self.shared.interrupted.load(Ordering::SeqCst) {
            self.shared.kill_child();
        }

        let (status, fed, stdout, stderr) = std::thread::scope(|s| {
            let feeder = s.spawn(move || -> io::Result<u64> {
                let Some(mut stdin) = stdin else {
                    return Ok(0);
                };
                let n = io::copy(input, &mut stdin)?;
                stdin.flush()?;
                Ok(n)
            });
            let out_reader = s.spawn(move || drain(stdout));
            let err_reader = s.spawn(move || drain(stderr));

            let status = self.wait_child();
            (
                status,
                feeder.join(),
                out_reader.join(),
                err_reader.join(),
            )
        });

        if self.shared.interrupted.load(Ordering::SeqCst) {
            return Err(ServiceError::Interrupted);
        }
        let status = status?;
        let stderr = stderr
            .ok()
            .and_then(Result::ok)
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
            .unwrap_or_default();

        if !status.success() {
            let lowered = stderr.to_ascii_lowercase();
            let detail = format!("unoconvert exited with {status}: {stderr}");
            if CONNECTION_MARKERS.iter().any(|m| lowered.contains(m)) {
                return Err(ServiceError::Connection(detail));
            }
            return Err(ServiceError::Generation(detail));
        }

        match fed {
            Ok(Ok(n)) => debug!("fed {} bytes to unoconvert", n),
            Ok(Err(e)) => {
                return Err(ServiceError::Generation(format!("feeding input: {e}")));
            }
            Err(_) => {
                return Err(ServiceError::Generation("input feeder panicked".into()));
            }
        }

        let bytes = match stdout {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(ServiceError::Generation(format!("reading output: {e}"))),
            Err(_) => return Err(ServiceError::Generation("output reader panicked".into())),
        };
        if bytes.is_empty() {
            return Err(ServiceError::Generation(format!(
                "unoconvert produced no output; stderr: {stderr}"
            )));
        }

        output
            .write_all(&bytes)
            .map_err(|e| ServiceError::Generation(format!("writing output: {e}")))
    }

    fn disconnect(&mut self) {
        let mut slot = self
            .shared
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(mut child) = slot.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn drain<R: Read>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    /// Service that runs `sh <script>` in place of unoconvert.
    fn scripted(dir: &tempfile::TempDir, body: &str) -> UnoconvertService {
        let script = dir.path().join("fake-unoconvert.sh");
        std::fs::write(&script, body).unwrap();
        UnoconvertService::new(Arc::new(FormatRegistry::office_defaults()))
            .with_program("sh")
            .with_leading_args([script])
    }

    fn listening() -> (TcpListener, ConnectionParams) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, ConnectionParams::new("127.0.0.1", port).unwrap())
    }

    #[test]
    fn streams_input_through_the_client() {
        let dir = tempfile::tempdir().unwrap();
        let service = scripted(&dir, "cat\n");
        let (_listener, params) = listening();

        let mut conn = service.connect(&params).unwrap();
        let mut input: &[u8] = b"spreadsheet bytes";
        let mut out = Vec::new();
        conn.convert(&mut input, "xlsx", &mut out, "pdf").unwrap();
        conn.disconnect();

        assert_eq!(out, b"spreadsheet bytes");
    }

    #[test]
    fn unreachable_port_is_a_connection_error() {
        let (listener, params) = listening();
        drop(listener);
        let service = UnoconvertService::new(Arc::new(FormatRegistry::office_defaults()))
            .with_connect_timeout(Duration::from_millis(500));

        let err = service.connect(&params).err().unwrap();
        assert!(matches!(err, ServiceError::Connection(_)), "got {err:?}");
    }

    #[test]
    fn non_zero_exit_is_a_generation_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = scripted(&dir, "cat >/dev/null\necho 'corrupt document' >&2\nexit 3\n");
        let (_listener, params) = listening();

        let mut conn = service.connect(&params).unwrap();
        let mut input: &[u8] = b"junk";
        let err = conn
            .convert(&mut input, "doc", &mut Vec::new(), "pdf")
            .unwrap_err();
        conn.disconnect();

        match err {
            ServiceError::Generation(msg) => assert!(msg.contains("corrupt document"), "{msg}"),
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[test]
    fn client_side_connection_refusal_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = scripted(&dir, "cat >/dev/null\necho 'Connection refused' >&2\nexit 1\n");
        let (_listener, params) = listening();

        let mut conn = service.connect(&params).unwrap();
        let mut input: &[u8] = b"x";
        let err = conn
            .convert(&mut input, "doc", &mut Vec::new(), "pdf")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Connection(_)), "got {err:?}");
    }

    #[test]
    fn unknown_format_fails_without_spawning() {
        let service = UnoconvertService::new(Arc::new(FormatRegistry::office_defaults()))
            .with_program("/nonexistent/unoconvert");
        let (_listener, params) = listening();

        let mut conn = service.connect(&params).unwrap();
        let mut input: &[u8] = b"x";
        let err = conn
            .convert(&mut input, "exe", &mut Vec::new(), "pdf")
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Generation("unsupported source format 'exe'".into())
        );
    }

    #[test]
    fn interrupter_kills_a_hung_client() {
        let dir = tempfile::tempdir().unwrap();
        let service = scripted(&dir, "exec sleep 30\n");
        let (_listener, params) = listening();

        let mut conn = service.connect(&params).unwrap();
        let interrupter = conn.interrupter();
        let killer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            interrupter.interrupt();
        });

        let started = Instant::now();
        let mut input: &[u8] = b"x";
        let err = conn
            .convert(&mut input, "xls", &mut Vec::new(), "pdf")
            .unwrap_err();
        conn.disconnect();
        killer.join().unwrap();

        assert_eq!(err, ServiceError::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
