use std::fs;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::CaptureSource;
use crate::decoder::DecoderChain;
use crate::error::CaptureError;
use crate::stats::BandwidthStats;

const TICK: Duration = Duration::from_secs(1);

/// Runs an external `tcpdump` for the session, then decodes what it wrote.
pub struct TcpdumpCapture {
    port: u16,
    interface: String,
    program: String,
    chain: DecoderChain,
    running: Arc<AtomicBool>,
}

impl TcpdumpCapture {
    pub fn new(port: u16, interface: impl Into<String>, running: Arc<AtomicBool>) -> Self {
        Self {
            port,
            interface: interface.into(),
            program: "tcpdump".to_string(),
            chain: DecoderChain::default(),
            running,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_chain(mut self, chain: DecoderChain) -> Self {
        self.chain = chain;
        self
    }

    fn spawn(&self, output: &Path) -> Result<Child, CaptureError> {
        debug!(
            "Starting {} -i {} -U -w {} udp port {}",
            self.program,
            self.interface,
            output.display(),
            self.port
        );

        Command::new(&self.program)
            .args(["-i", &self.interface, "-U", "-w"])
            .arg(output)
            .arg(format!("udp port {}", self.port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::ToolUnavailable {
                tool: self.program.clone(),
                source: e,
            })
    }

    /// Wait out the session; returns the exit status if the tool died early.
    fn wait_for(
        &self,
        child: &mut Child,
        duration: Duration,
    ) -> Result<Option<ExitStatus>, CaptureError> {
        let started = Instant::now();
        let total_secs = duration.as_secs();

        while started.elapsed() < duration {
            if !self.running.load(Ordering::SeqCst) {
                info!("Capture stopped by user");
                return Ok(None);
            }
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }

            let remaining = duration.saturating_sub(started.elapsed());
            thread::sleep(remaining.min(TICK));
            info!("Capturing... {}/{}s", started.elapsed().as_secs().min(total_secs), total_secs);
        }

        Ok(None)
    }
}

impl CaptureSource for TcpdumpCapture {
    fn describe(&self) -> String {
        format!("{} on {} (udp port {})", self.program, self.interface, self.port)
    }

    fn monitor(&mut self, duration: Duration) -> Result<BandwidthStats, CaptureError> {
        let mut stats = BandwidthStats::new();

        let capture_file = tempfile::Builder::new()
            .prefix("rtgp-capture-")
            .suffix(".pcap")
            .tempfile()?;
        let path = capture_file.path();

        let mut child = self.spawn(path)?;
        match self.wait_for(&mut child, duration)? {
            Some(status) if !status.success() => {
                warn!("{} exited early ({}), no data captured", self.program, status);
                return Ok(stats);
            }
            Some(status) => debug!("{} finished on its own ({})", self.program, status),
            None => stop(&mut child)?,
        }

        let captured = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if captured == 0 {
            warn!("{} wrote no data", self.program);
            return Ok(stats);
        }

        let decoded = self.chain.decode(path, self.port)?;
        info!("Decoded {} packets with {}", decoded.packets.len(), decoded.decoder);
        stats.record_all(decoded.packets);

        // capture_file is removed on drop
        Ok(stats)
    }
}

/// Ask the capture tool to flush and exit, as Ctrl+C would.
fn stop(child: &mut Child) -> Result<(), CaptureError> {
    #[cfg(unix)]
    {
        let pid = child.id() as libc::pid_t;
        // SAFETY: pid belongs to a child we spawned and have not reaped yet
        if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
            child.kill()?;
        }
    }
    #[cfg(not(unix))]
    child.kill()?;

    let status = child.wait()?;
    debug!("Capture tool stopped ({})", status);
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::decoder::{CaptureDecoder, DecoderChain, ManualPcapDecoder};
    use crate::error::DecodeError;
    use crate::packet::ClassifiedPacket;

    fn running() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    #[test]
    fn test_missing_tool_is_fatal() {
        let mut capture =
            TcpdumpCapture::new(4242, "any", running()).with_program("/nonexistent/tcpdump");
        let result = capture.monitor(Duration::from_secs(1));
        assert!(matches!(result, Err(CaptureError::ToolUnavailable { .. })));
    }

    #[test]
    fn test_abnormal_exit_means_no_data() {
        // `false` ignores its arguments and exits 1 straight away
        let mut capture = TcpdumpCapture::new(4242, "any", running()).with_program("false");
        let started = Instant::now();
        let stats = capture.monitor(Duration::from_secs(10)).unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(stats.total_packets(), 0);
    }

    struct AlwaysFails;

    impl CaptureDecoder for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        fn can_handle(&self, _path: &Path) -> bool {
            true
        }

        fn decode(&self, _path: &Path, _port: u16) -> Result<Vec<ClassifiedPacket>, DecodeError> {
            Err(DecodeError::Unsupported("test".into()))
        }
    }

    /// Write an executable stand-in for tcpdump. `$out` holds its `-w` argument.
    fn stub_tool(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tcpdump-stub");
        let script = format!(
            "#!/bin/sh\n\
             while [ \"$#\" -gt 0 ]; do\n\
             if [ \"$1\" = \"-w\" ]; then out=\"$2\"; fi\n\
             shift\n\
             done\n\
             {}\n\
             exec sleep 30\n",
            body
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    /// A freshly written script can briefly be busy if another test forks meanwhile
    fn monitor_stub(
        capture: &mut TcpdumpCapture,
        duration: Duration,
    ) -> Result<BandwidthStats, CaptureError> {
        for _ in 0..5 {
            match capture.monitor(duration) {
                Err(CaptureError::ToolUnavailable { source, .. })
                    if source.raw_os_error() == Some(libc::ETXTBSY) =>
                {
                    thread::sleep(Duration::from_millis(50));
                }
                other => return other,
            }
        }
        capture.monitor(duration)
    }

    fn alternating_capture(dir: &Path) -> std::path::PathBuf {
        use crate::decoder::test_files::{LINKTYPE_ETHERNET, le_pcap};
        use crate::peeler::test_frames::{ethernet, rtgp};

        let frames = vec![
            (1, ethernet(50000, 4242, &rtgp(0x20, 17))),
            (2, ethernet(4242, 50000, &rtgp(0x11, 36))),
            (3, ethernet(50000, 4242, &[0u8; 5])),
        ];
        let path = dir.join("recorded.pcap");
        fs::write(&path, le_pcap(LINKTYPE_ETHERNET, &frames)).unwrap();
        path
    }

    #[test]
    fn test_empty_output_is_not_a_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_tool(dir.path(), ": > \"$out\"");
        let mut capture = TcpdumpCapture::new(4242, "any", running())
            .with_program(program)
            .with_chain(DecoderChain::new().with_decoder(AlwaysFails));

        // The tool is still running at the deadline and gets stopped with SIGTERM
        let started = Instant::now();
        let stats = monitor_stub(&mut capture, Duration::from_millis(500)).unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(stats.total_packets(), 0);
        assert_eq!(stats.invalid_packets, 0);
    }

    #[test]
    fn test_stopped_capture_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = alternating_capture(dir.path());
        let program = stub_tool(dir.path(), &format!("cp '{}' \"$out\"", recorded.display()));
        let mut capture = TcpdumpCapture::new(4242, "any", running())
            .with_program(program)
            .with_chain(DecoderChain::new().with_decoder(ManualPcapDecoder));

        let stats = monitor_stub(&mut capture, Duration::from_secs(1)).unwrap();

        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_received, 17 + 5);
        assert_eq!(stats.bytes_sent, 36);
        assert_eq!(stats.invalid_packets, 1);
        assert_eq!(stats.packet_stats[&0x20].count, 1);
        assert_eq!(stats.packet_stats[&0x11].count, 1);
    }

    #[test]
    fn test_cancelled_capture_is_still_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = alternating_capture(dir.path());
        let program = stub_tool(dir.path(), &format!("cp '{}' \"$out\"", recorded.display()));

        let running = running();
        let mut capture = TcpdumpCapture::new(4242, "any", running.clone())
            .with_program(program)
            .with_chain(DecoderChain::new().with_decoder(ManualPcapDecoder));

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            running.store(false, Ordering::SeqCst);
        });

        let started = Instant::now();
        let stats = monitor_stub(&mut capture, Duration::from_secs(30)).unwrap();
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(stats.total_packets(), 3);
    }

    #[test]
    fn test_undecodable_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_tool(dir.path(), "echo 'not a capture' > \"$out\"");
        let mut capture = TcpdumpCapture::new(4242, "any", running())
            .with_program(program)
            .with_chain(DecoderChain::new().with_decoder(AlwaysFails));

        assert!(matches!(
            monitor_stub(&mut capture, Duration::from_millis(500)),
            Err(CaptureError::Decode(DecodeError::Exhausted { .. }))
        ));
    }
}
