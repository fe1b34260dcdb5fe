pub mod monitor;
pub mod rebase;
pub mod remap;
pub mod switch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::analyze::StreamInfo;
use crate::buffer::Snapshot;
use crate::sink::PacketSink;
use crate::source::Source;
use crate::stats::RelayStats;
use crate::ts::time::wrapping_delta;
use crate::ts::{TsPacket, NOMINAL_FRAME_DURATION};

use self::monitor::OutputMonitor;
use self::rebase::{SourceBases, TimestampRebaser};
use self::remap::PidMapper;
use self::switch::{SwitchController, SwitchState};

const CONSUME_BATCH: usize = 256;
const CONSUME_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no source became ready")]
    NoUsableSource,
}

pub struct EngineSettings {
    pub live_idr_timeout: Duration,
    pub fallback_idr_timeout: Duration,
}

struct RunState {
    fallback: bool,
    bases: SourceBases,
    info: StreamInfo,
    remap: bool,
}

#[derive(Clone, Copy)]
struct PendingSwitch {
    to_fallback: bool,
    since: Instant,
}

/// The single consumer of both sources. Owns the sink, the global timestamp
/// offsets and the emitted stream's continuity state; every emitted packet
/// passes through rebaser, mapper and monitor in that order.
pub struct Engine {
    live: Arc<Source>,
    fallback: Arc<Source>,
    controller: Arc<SwitchController>,
    settings: EngineSettings,
    stats: Arc<RelayStats>,
    running: Arc<AtomicBool>,
    sink: Box<dyn PacketSink>,
    rebaser: TimestampRebaser,
    mapper: PidMapper,
    monitor: OutputMonitor,
    active: Option<RunState>,
    pending: Option<PendingSwitch>,
    run_first_pts: Option<u64>,
    run_last_pts: Option<u64>,
    output_video_pid: u16,
}

impl Engine {
    pub fn new(
        live: Arc<Source>,
        fallback: Arc<Source>,
        controller: Arc<SwitchController>,
        sink: Box<dyn PacketSink>,
        stats: Arc<RelayStats>,
        running: Arc<AtomicBool>,
        settings: EngineSettings,
    ) -> Self {
        let monitor = OutputMonitor::new(stats.clone());
        Self {
            live,
            fallback,
            controller,
            settings,
            stats,
            running,
            sink,
            rebaser: TimestampRebaser::new(),
            mapper: PidMapper::new(None, &StreamInfo::default()),
            monitor,
            active: None,
            pending: None,
            run_first_pts: None,
            run_last_pts: None,
            output_video_pid: 0,
        }
    }

    /// Blocks until shutdown. Returns an error only when neither source ever
    /// produced a usable stream.
    pub fn run(mut self) -> Result<(), EngineError> {
        let live_ready = self.live.wait_for_ready(self.settings.live_idr_timeout);
        if !live_ready {
            tracing::warn!(
                source = %self.live.name(),
                timeout_ms = self.settings.live_idr_timeout.as_millis() as u64,
                "live source not ready, starting on fallback"
            );
        }
        let fallback_ready = self.fallback.wait_for_ready(self.settings.fallback_idr_timeout);
        if !fallback_ready {
            tracing::warn!(source = %self.fallback.name(), "fallback source not ready");
        }
        if !self.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        if !live_ready && !fallback_ready {
            return Err(EngineError::NoUsableSource);
        }

        let live_info = self.live.info();
        let fallback_info = self.fallback.info();
        if live_info.initialized && fallback_info.initialized {
            let compatible = PidMapper::layouts_compatible(&live_info, &fallback_info);
            self.stats
                .stream_incompatible
                .store(!compatible, Ordering::Relaxed);
            if !compatible {
                tracing::warn!("live and fallback carry different codecs");
            }
        }
        self.mapper
            .rebuild(live_info.initialized.then_some(&live_info), &fallback_info);

        let start_fallback = !live_ready || self.controller.privacy();
        let initial = if self.controller.privacy() {
            SwitchState::PrivacyForcedFallback
        } else if start_fallback {
            SwitchState::Fallback
        } else {
            SwitchState::Live
        };
        self.controller.force_state(initial);

        if !self.begin_run(start_fallback) {
            self.pending = Some(PendingSwitch {
                to_fallback: start_fallback,
                since: Instant::now(),
            });
        }

        while self.running.load(Ordering::Relaxed) {
            self.tick();
        }
        tracing::info!("engine stopped");
        Ok(())
    }

    fn source_for(&self, fallback: bool) -> &Arc<Source> {
        if fallback {
            &self.fallback
        } else {
            &self.live
        }
    }

    fn idr_timeout_for(&self, fallback: bool) -> Duration {
        if fallback {
            self.settings.fallback_idr_timeout
        } else {
            self.settings.live_idr_timeout
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let desired = self
            .controller
            .evaluate(now, self.live.is_media_ready(), self.live.buffer().is_ready())
            .uses_fallback();

        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.to_fallback != desired)
        {
            self.pending = None;
        }
        let active_fb = self.active.as_ref().map(|r| r.fallback);
        if self.pending.is_none() && active_fb != Some(desired) {
            let target = self.source_for(desired);
            target.reset_for_new_loop();
            tracing::info!(source = %target.name(), "waiting for a fresh clean switch point");
            self.pending = Some(PendingSwitch {
                to_fallback: desired,
                since: now,
            });
        }

        if let Some(pending) = self.pending {
            let to_fallback = pending.to_fallback;
            let waited = pending.since.elapsed();
            if self.source_for(to_fallback).buffer().is_ready() {
                self.finish_segment();
                if self.begin_run(to_fallback) {
                    self.pending = None;
                }
            } else if waited > self.idr_timeout_for(to_fallback) {
                if to_fallback {
                    // The fallback is all there is; keep trying.
                    tracing::warn!("fallback produced no clean switch point, re-arming");
                    self.source_for(true).reset_for_new_loop();
                    self.pending = Some(PendingSwitch {
                        to_fallback,
                        since: Instant::now(),
                    });
                } else {
                    tracing::warn!("live produced no clean switch point, staying on fallback");
                    self.controller.force_state(SwitchState::Fallback);
                    self.pending = None;
                }
            }
        }

        let Some((run_fb, bases, info, remap)) = self
            .active
            .as_ref()
            .map(|r| (r.fallback, r.bases, r.info.clone(), r.remap))
        else {
            std::thread::sleep(CONSUME_POLL);
            return;
        };

        // Under privacy, nothing from the live source leaves the engine,
        // even while the fallback's switch point is still pending.
        if run_fb != desired && self.controller.privacy() {
            std::thread::sleep(CONSUME_POLL);
            return;
        }

        let source = self.source_for(run_fb).clone();
        let batch = source.buffer().consume(CONSUME_BATCH, CONSUME_POLL);
        let mut failed = false;
        let mut dropped = 0u64;
        for pkt in batch {
            if failed {
                dropped += 1;
                continue;
            }
            if self.emit_packet(pkt, &bases, &info, remap).is_err() {
                failed = true;
            }
        }
        if failed {
            if dropped > 0 {
                self.stats.packets_dropped.fetch_add(dropped, Ordering::Relaxed);
            }
            // The sink went away mid-run; resume this source at its next
            // clean switch point once the sink reopens.
            self.finish_segment();
            self.active = None;
            source.reset_for_new_loop();
            self.pending = Some(PendingSwitch {
                to_fallback: run_fb,
                since: Instant::now(),
            });
        }
    }

    /// Emits the IDR-aligned snapshot of the chosen source and stitches the
    /// consume cursor onto its end.
    fn begin_run(&mut self, fallback: bool) -> bool {
        let source = self.source_for(fallback).clone();
        let Some(snap) = source.buffer().snapshot_from_audio_sync() else {
            return false;
        };
        let info = source.info();
        let live_info = self.live.info();
        let fallback_info = self.fallback.info();
        self.mapper
            .rebuild(live_info.initialized.then_some(&live_info), &fallback_info);
        let remap = fallback && live_info.initialized;
        // The PID the run's video leaves the engine on, for segment-length
        // tracking.
        self.output_video_pid = if remap {
            live_info.video_pid
        } else {
            info.video_pid
        };
        let bases = extract_bases(&snap, &info);
        source.buffer().init_consume_from(snap.end_seq);
        tracing::info!(
            source = %source.name(),
            start_seq = snap.start_seq,
            packets = snap.packets.len(),
            pts_base = bases.pts_base,
            "starting run"
        );

        for (i, pkt) in snap.packets.iter().enumerate() {
            let seq = snap.start_seq + i as u64;
            // Audio before its sync point belongs to a frame that started
            // before the switch point.
            if pkt.pid() == info.audio_pid && seq < snap.audio_sync_seq {
                continue;
            }
            if self.emit_packet(pkt.clone(), &bases, &info, remap).is_err() {
                self.finish_segment();
                return false;
            }
        }
        self.active = Some(RunState {
            fallback,
            bases,
            info,
            remap,
        });
        true
    }

    fn emit_packet(
        &mut self,
        mut pkt: TsPacket,
        bases: &SourceBases,
        info: &StreamInfo,
        remap: bool,
    ) -> std::io::Result<()> {
        // A PES that is supposed to start here but carries no start code is
        // malformed; it is neither rewritten nor emitted.
        if pkt.payload_unit_start()
            && (pkt.pid() == info.video_pid || pkt.pid() == info.audio_pid)
            && !pkt.is_pes_start()
        {
            tracing::debug!(pid = pkt.pid(), "dropping malformed PES start");
            return Ok(());
        }
        self.rebaser.rebase_packet(&mut pkt, bases, info);
        self.mapper.process(&mut pkt, remap);
        self.monitor.observe(&pkt);
        if pkt.pid() == self.output_video_pid {
            if let Some(pts) = pkt.pes_pts() {
                if self.run_first_pts.is_none() {
                    self.run_first_pts = Some(pts);
                }
                self.run_last_pts = Some(pts);
            }
        }
        self.sink.write_packet(&pkt)
    }

    /// Advances the global offsets past the segment just emitted so the next
    /// run lands one frame after it.
    fn finish_segment(&mut self) {
        if let (Some(first), Some(last)) = (self.run_first_pts, self.run_last_pts) {
            let duration = wrapping_delta(last, first) + NOMINAL_FRAME_DURATION;
            self.rebaser.advance_offsets(duration);
            tracing::debug!(
                duration,
                pts_offset = self.rebaser.pts_offset(),
                "segment finished"
            );
        }
        self.run_first_pts = None;
        self.run_last_pts = None;
    }
}

/// Captures the timestamp bases from a run's opening snapshot: the video
/// base from the switch point's access unit, the audio base from the audio
/// sync point, the PCR base from the first PCR seen.
fn extract_bases(snap: &Snapshot, info: &StreamInfo) -> SourceBases {
    let mut pts_base = None;
    let mut audio_base = None;
    let mut pcr_base = None;
    for (i, pkt) in snap.packets.iter().enumerate() {
        let seq = snap.start_seq + i as u64;
        if pcr_base.is_none() {
            pcr_base = pkt.pcr_base();
        }
        if pts_base.is_none() && pkt.pid() == info.video_pid && pkt.is_pes_start() {
            pts_base = pkt.pes_dts().or_else(|| pkt.pes_pts());
        }
        if audio_base.is_none()
            && pkt.pid() == info.audio_pid
            && seq >= snap.audio_sync_seq
            && pkt.is_pes_start()
        {
            audio_base = pkt.pes_pts();
        }
        if pts_base.is_some() && audio_base.is_some() && pcr_base.is_some() {
            break;
        }
    }
    let pts_base = pts_base.unwrap_or(0);
    SourceBases {
        pts_base,
        audio_pts_base: audio_base.unwrap_or(pts_base),
        pcr_base: pcr_base.unwrap_or(pts_base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TestFeeder;
    use crate::ts::testutil;
    use std::sync::Mutex;
    use std::thread;

    const LIVE_MARK: u8 = 0xa1;
    const FB_MARK: u8 = 0xfb;

    struct TestSink(Arc<Mutex<Vec<TsPacket>>>);

    impl PacketSink for TestSink {
        fn write_packet(&mut self, pkt: &TsPacket) -> std::io::Result<()> {
            self.0.lock().unwrap().push(pkt.clone());
            Ok(())
        }
    }

    struct Fixture {
        live: Arc<Source>,
        fallback: Arc<Source>,
        controller: Arc<SwitchController>,
        stats: Arc<RelayStats>,
        out: Arc<Mutex<Vec<TsPacket>>>,
        running: Arc<AtomicBool>,
    }

    impl Fixture {
        fn new(gap_ms: u64, min_consecutive: u64) -> (Self, Engine) {
            let live = Source::new("live", 2048, 2048);
            let fallback = Source::new("fallback", 2048, 2048);
            let controller = Arc::new(SwitchController::new(
                Duration::from_millis(gap_ms),
                min_consecutive,
                None,
            ));
            let stats = Arc::new(RelayStats::new());
            let out = Arc::new(Mutex::new(Vec::new()));
            let running = Arc::new(AtomicBool::new(true));
            let engine = Engine::new(
                live.clone(),
                fallback.clone(),
                controller.clone(),
                Box::new(TestSink(out.clone())),
                stats.clone(),
                running.clone(),
                EngineSettings {
                    live_idr_timeout: Duration::from_millis(2000),
                    fallback_idr_timeout: Duration::from_millis(2000),
                },
            );
            (
                Self {
                    live,
                    fallback,
                    controller,
                    stats,
                    out,
                    running,
                },
                engine,
            )
        }

        fn stop(&self, handle: thread::JoinHandle<Result<(), EngineError>>) {
            self.running.store(false, Ordering::Relaxed);
            self.live.close();
            self.fallback.close();
            handle.join().unwrap().unwrap();
        }

        fn output(&self) -> Vec<TsPacket> {
            self.out.lock().unwrap().clone()
        }
    }

    fn feed_psi(f: &mut TestFeeder, pmt: u16, video: u16, audio: u16) {
        f.feed(testutil::pat_packet(0, pmt));
        f.feed(testutil::pmt_packet(pmt, 0, video, video, audio));
    }

    fn feed_video(f: &mut TestFeeder, pid: u16, cc: &mut u8, pts: u64, idr: bool, marker: u8) {
        let nals = if idr {
            testutil::idr_nals(marker)
        } else {
            testutil::non_idr_nals(marker)
        };
        let refs: Vec<&[u8]> = nals.iter().map(|n| n.as_slice()).collect();
        f.feed(testutil::video_pes_packet(pid, *cc, pts, None, &refs));
        *cc = (*cc + 1) & 0x0f;
    }

    fn feed_audio(f: &mut TestFeeder, pid: u16, cc: &mut u8, pts: u64) {
        f.feed(testutil::audio_pes_packet(pid, *cc, pts));
        *cc = (*cc + 1) & 0x0f;
    }

    /// Which source a video packet came from, read back from the marker byte
    /// the test builders put in the slice NAL.
    fn origin_marker(pkt: &TsPacket) -> Option<u8> {
        let p = pkt.payload()?;
        p.windows(4).find_map(|w| {
            if (w[0] == 0x65 && w[1] == 0x88 && w[2] == 0x84)
                || (w[0] == 0x41 && w[1] == 0x9a && w[2] == 0x24)
            {
                Some(w[3])
            } else {
                None
            }
        })
    }

    fn contains_sps(pkt: &TsPacket) -> bool {
        pkt.payload()
            .map(|p| {
                p.windows(4)
                    .any(|w| w == [0x00, 0x00, 0x01, 0x67])
            })
            .unwrap_or(false)
    }

    #[test]
    fn steady_live_passthrough() {
        let (fx, engine) = Fixture::new(10_000, 10);

        let mut lf = TestFeeder::new(fx.live.clone());
        feed_psi(&mut lf, 0x1000, 0x100, 0x101);
        let (mut vcc, mut acc) = (0u8, 0u8);
        feed_video(&mut lf, 0x100, &mut vcc, 90_000, true, LIVE_MARK);
        feed_audio(&mut lf, 0x101, &mut acc, 90_000);
        for i in 1..=5u64 {
            feed_video(&mut lf, 0x100, &mut vcc, 90_000 + i * 3003, false, LIVE_MARK);
        }

        let mut ff = TestFeeder::new(fx.fallback.clone());
        feed_psi(&mut ff, 0x1001, 0x200, 0x201);
        let (mut fvcc, mut facc) = (0u8, 0u8);
        feed_video(&mut ff, 0x200, &mut fvcc, 500_000, true, FB_MARK);
        feed_audio(&mut ff, 0x201, &mut facc, 500_000);
        feed_video(&mut ff, 0x200, &mut fvcc, 503_003, true, FB_MARK);

        let handle = thread::spawn(move || engine.run());
        thread::sleep(Duration::from_millis(400));
        fx.stop(handle);

        let out = fx.output();
        assert!(!out.is_empty());
        // Output timeline starts at zero and steps one frame at a time.
        let video_pts: Vec<u64> = out
            .iter()
            .filter(|p| p.pid() == 0x100)
            .filter_map(|p| p.pes_pts())
            .collect();
        assert_eq!(video_pts, vec![0, 3003, 6006, 9009, 12012, 15015]);

        // Only the live source's PIDs appear.
        assert!(out.iter().all(|p| p.pid() == 0x100 || p.pid() == 0x101));
        assert!(out
            .iter()
            .all(|p| origin_marker(p).map(|m| m == LIVE_MARK).unwrap_or(true)));

        // Continuity advances by one per payload packet on each PID.
        for pid in [0x100u16, 0x101] {
            let ccs: Vec<u8> = out
                .iter()
                .filter(|p| p.pid() == pid && p.has_payload())
                .map(|p| p.continuity_counter())
                .collect();
            for w in ccs.windows(2) {
                assert_eq!(w[1], (w[0] + 1) & 0x0f);
            }
        }

        assert_eq!(fx.controller.state(), SwitchState::Live);
        assert_eq!(fx.stats.pts_discontinuities.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn live_outage_fails_over_cleanly() {
        let (fx, engine) = Fixture::new(150, 10);

        let mut lf = TestFeeder::new(fx.live.clone());
        feed_psi(&mut lf, 0x1000, 0x100, 0x101);
        let (mut vcc, mut acc) = (0u8, 0u8);
        feed_video(&mut lf, 0x100, &mut vcc, 90_000, true, LIVE_MARK);
        feed_audio(&mut lf, 0x101, &mut acc, 90_000);
        for i in 1..=3u64 {
            feed_video(&mut lf, 0x100, &mut vcc, 90_000 + i * 3003, false, LIVE_MARK);
        }
        fx.controller.note_live_packet(Instant::now());

        let mut ff = TestFeeder::new(fx.fallback.clone());
        feed_psi(&mut ff, 0x1001, 0x200, 0x201);
        let (mut fvcc, mut facc) = (0u8, 0u8);
        feed_video(&mut ff, 0x200, &mut fvcc, 500_000, true, FB_MARK);
        feed_audio(&mut ff, 0x201, &mut facc, 500_000);

        // Fallback keeps producing clean access units while the live feed
        // goes quiet after its initial burst.
        let feeder_running = fx.running.clone();
        let feeder = thread::spawn(move || {
            let mut pts = 503_003u64;
            while feeder_running.load(Ordering::Relaxed) {
                feed_audio(&mut ff, 0x201, &mut facc, pts);
                feed_video(&mut ff, 0x200, &mut fvcc, pts, true, FB_MARK);
                pts += 3003;
                thread::sleep(Duration::from_millis(20));
            }
        });

        let handle = thread::spawn(move || engine.run());
        thread::sleep(Duration::from_millis(900));
        fx.stop(handle);
        feeder.join().unwrap();

        let out = fx.output();
        // Everything is remapped onto the live layout.
        assert!(out.iter().all(|p| p.pid() == 0x100 || p.pid() == 0x101));

        let markers: Vec<(usize, u8)> = out
            .iter()
            .enumerate()
            .filter(|(_, p)| p.pid() == 0x100)
            .filter_map(|(i, p)| origin_marker(p).map(|m| (i, m)))
            .collect();
        assert!(markers.iter().any(|&(_, m)| m == LIVE_MARK));
        let first_fb = markers
            .iter()
            .find(|&&(_, m)| m == FB_MARK)
            .expect("failover never produced fallback output")
            .0;

        // The new run starts with a PES start whose access unit carries the
        // parameter sets.
        let boundary = &out[first_fb];
        assert!(boundary.is_pes_start());
        assert_eq!(boundary.pid(), 0x100);
        assert!(contains_sps(boundary));

        // The output timeline keeps increasing across the switch.
        let video_pts: Vec<u64> = out
            .iter()
            .filter(|p| p.pid() == 0x100)
            .filter_map(|p| p.pes_pts())
            .collect();
        for w in video_pts.windows(2) {
            assert!(w[1] > w[0], "pts went backwards: {} -> {}", w[0], w[1]);
        }
        assert_eq!(fx.stats.pts_discontinuities.load(Ordering::Relaxed), 0);
        assert!(fx.controller.state().uses_fallback());
    }

    #[test]
    fn privacy_forces_fallback_until_released() {
        let (fx, engine) = Fixture::new(10_000, 5);

        let mut lf = TestFeeder::new(fx.live.clone());
        feed_psi(&mut lf, 0x1000, 0x100, 0x101);
        let (mut vcc, mut acc) = (0u8, 0u8);
        feed_video(&mut lf, 0x100, &mut vcc, 90_000, true, LIVE_MARK);
        feed_audio(&mut lf, 0x101, &mut acc, 90_000);

        let mut ff = TestFeeder::new(fx.fallback.clone());
        feed_psi(&mut ff, 0x1001, 0x200, 0x201);
        let (mut fvcc, mut facc) = (0u8, 0u8);
        feed_video(&mut ff, 0x200, &mut fvcc, 500_000, true, FB_MARK);
        feed_audio(&mut ff, 0x201, &mut facc, 500_000);

        let live_feeder = {
            let running = fx.running.clone();
            let controller = fx.controller.clone();
            thread::spawn(move || {
                let mut pts = 93_003u64;
                while running.load(Ordering::Relaxed) {
                    controller.note_live_packet(Instant::now());
                    feed_audio(&mut lf, 0x101, &mut acc, pts);
                    feed_video(&mut lf, 0x100, &mut vcc, pts, true, LIVE_MARK);
                    pts += 3003;
                    thread::sleep(Duration::from_millis(15));
                }
            })
        };
        let fb_feeder = {
            let running = fx.running.clone();
            thread::spawn(move || {
                let mut pts = 503_003u64;
                while running.load(Ordering::Relaxed) {
                    feed_audio(&mut ff, 0x201, &mut facc, pts);
                    feed_video(&mut ff, 0x200, &mut fvcc, pts, true, FB_MARK);
                    pts += 3003;
                    thread::sleep(Duration::from_millis(15));
                }
            })
        };

        let handle = thread::spawn(move || engine.run());
        thread::sleep(Duration::from_millis(300));
        assert_eq!(fx.controller.state(), SwitchState::Live);

        let before_privacy = fx.out.lock().unwrap().len();
        fx.controller.set_privacy(true);
        thread::sleep(Duration::from_millis(500));
        let at_release = fx.out.lock().unwrap().len();
        fx.controller.set_privacy(false);
        thread::sleep(Duration::from_millis(800));
        fx.stop(handle);
        live_feeder.join().unwrap();
        fb_feeder.join().unwrap();

        let out = fx.output();

        // After privacy was asserted, the first fallback packet appears and
        // from then until release nothing originates from live.
        let window: Vec<u8> = out[before_privacy..at_release]
            .iter()
            .filter_map(origin_marker)
            .collect();
        let first_fb = window
            .iter()
            .position(|&m| m == FB_MARK)
            .expect("privacy never produced fallback output");
        assert!(
            window[first_fb..].iter().all(|&m| m == FB_MARK),
            "live output leaked while privacy was on"
        );

        // After release the normal recovery path brings live back.
        let last_marker = out
            .iter()
            .rev()
            .find_map(origin_marker)
            .expect("no video output");
        assert_eq!(last_marker, LIVE_MARK);
        assert_eq!(fx.controller.state(), SwitchState::Live);
        assert_eq!(fx.stats.pts_discontinuities.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn no_source_is_fatal() {
        let live = Source::new("live", 16, 64);
        let fallback = Source::new("fallback", 16, 64);
        let controller = Arc::new(SwitchController::new(Duration::from_secs(2), 10, None));
        let stats = Arc::new(RelayStats::new());
        let running = Arc::new(AtomicBool::new(true));
        let engine = Engine::new(
            live,
            fallback,
            controller,
            Box::new(TestSink(Arc::new(Mutex::new(Vec::new())))),
            stats,
            running,
            EngineSettings {
                live_idr_timeout: Duration::from_millis(50),
                fallback_idr_timeout: Duration::from_millis(50),
            },
        );
        assert!(matches!(engine.run(), Err(EngineError::NoUsableSource)));
    }
}
