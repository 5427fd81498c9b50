use std::sync::Arc;
use std::time::Instant;

use crate::error::{DecodeError, Result};
use crate::frame::VideoFrame;
use crate::framebuffer::Framebuffer;
use crate::packet::{CdgCommand, ScrollMode, SubcodePacket};
use crate::palette::Palette;
use crate::{FRAME_HEIGHT, FRAME_INTERVAL_MS, FRAME_WIDTH, PACKETS_PER_FRAME, PACKET_SIZE};

/// Playback tempo corresponding to real time, in percent.
const DEFAULT_TEMPO: i32 = 100;

/// CDG stream decoder.
///
/// Lifecycle: `open` a byte stream, `process` it once, then look frames up
/// by timestamp with `frame_at` and `can_skip_at`. `reset` returns the
/// decoder to its initial state for reuse.
///
/// Processing interprets drawing commands against a 300x216 indexed
/// framebuffer and snapshots the visible 288x192 safe area every 40 ms of
/// stream time, together with a "skip" flag marking frames identical to
/// their predecessor.
pub struct CdgDecoder {
    framebuffer: Framebuffer,
    palette: Arc<Palette>,
    h_offset: u8,
    v_offset: u8,
    frames: Vec<VideoFrame>,
    skip: Vec<bool>,
    input: Option<Vec<u8>>,
    total_packets: usize,
    position: usize,
    last_was_memory_preset: bool,
    last_update_ms: u32,
    tempo: i32,
    is_open: bool,
}

impl Default for CdgDecoder {
    fn default() -> Self {
        CdgDecoder {
            framebuffer: Framebuffer::default(),
            palette: Arc::new(Palette::default()),
            h_offset: 0,
            v_offset: 0,
            frames: Vec::new(),
            skip: Vec::new(),
            input: None,
            total_packets: 0,
            position: 0,
            last_was_memory_preset: false,
            last_update_ms: 0,
            tempo: DEFAULT_TEMPO,
            is_open: false,
        }
    }
}

impl CdgDecoder {
    pub fn new() -> Self {
        CdgDecoder::default()
    }

    /// Returns the decoder to its initial state, releasing decoded frames
    /// and any pending input. Idempotent.
    pub fn reset(&mut self) {
        log::debug!("resetting decoder state and releasing frames");
        self.framebuffer.clear();
        self.palette = Arc::new(Palette::default());
        self.h_offset = 0;
        self.v_offset = 0;
        self.frames = Vec::new();
        self.skip = Vec::new();
        self.input = None;
        self.total_packets = 0;
        self.position = 0;
        self.last_was_memory_preset = false;
        self.last_update_ms = 0;
        self.tempo = DEFAULT_TEMPO;
        self.is_open = false;
    }

    /// Takes ownership of a raw CDG byte stream for processing.
    ///
    /// Any previous state is reset first. A trailing partial packet is
    /// ignored. Fails only on empty input, leaving the decoder reset.
    pub fn open(&mut self, bytes: Vec<u8>) -> Result<()> {
        log::info!("opening {} bytes of CDG data", bytes.len());
        self.reset();
        if bytes.is_empty() {
            log::warn!("received zero bytes of CDG data");
            return Err(DecodeError::EmptyInput);
        }
        self.total_packets = bytes.len() / PACKET_SIZE;
        let frame_count = self.total_packets / PACKETS_PER_FRAME;
        self.frames.reserve(frame_count);
        self.skip.reserve(frame_count);
        self.input = Some(bytes);
        Ok(())
    }

    /// Runs the full decode over the opened bytes, releasing them when done.
    ///
    /// Calling this without a prior successful `open`, or a second time for
    /// the same input, is a no-op.
    pub fn process(&mut self) -> Result<()> {
        let Some(data) = self.input.take() else {
            log::warn!("process called with no opened data, ignoring");
            return Ok(());
        };
        log::info!("processing {} subcode packets", self.total_packets);
        let started = Instant::now();

        // Accumulates "something visible changed" across one 40 ms window.
        let mut changed = false;
        for raw in data.chunks_exact(PACKET_SIZE) {
            if let Some(packet) = SubcodePacket::from_bytes(raw) {
                let command = packet.command();
                if let Some(command) = &command {
                    if self.apply(command) {
                        changed = true;
                        self.last_update_ms = self.frames.len() as u32 * FRAME_INTERVAL_MS;
                    }
                }
                self.last_was_memory_preset =
                    matches!(command, Some(CdgCommand::MemoryPreset { .. }));
            }
            self.position += 1;
            if self.position % PACKETS_PER_FRAME == 0 {
                self.sample_frame(changed);
                changed = false;
            }
        }

        self.is_open = true;
        log::info!(
            "decoded {} frames in {} ms",
            self.frames.len(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Frame current at `ms` of (tempo-scaled) playback time.
    ///
    /// Requests past the end return the last frame; `None` only when the
    /// stream was too short to produce any frame at all.
    pub fn frame_at(&self, ms: u32) -> Option<&VideoFrame> {
        let index = self.frame_index(ms);
        self.frames.get(index).or_else(|| self.frames.last())
    }

    /// True when the frame at `ms` and both of its immediate neighbors are
    /// identical to their predecessors, so a renderer may hold the previous
    /// picture. Missing neighbors count as not skippable.
    pub fn can_skip_at(&self, ms: u32) -> bool {
        let index = self.frame_index(ms);
        if index == 0 || index + 1 >= self.skip.len() {
            return false;
        }
        self.skip[index - 1] && self.skip[index] && self.skip[index + 1]
    }

    /// Total stream duration in milliseconds, derived from the packet count.
    pub fn duration_ms(&self) -> u32 {
        (self.total_packets as u64 * u64::from(FRAME_INTERVAL_MS) / PACKETS_PER_FRAME as u64)
            as u32
    }

    /// Stream time of the last command that visibly changed the output.
    pub fn last_update_ms(&self) -> u32 {
        self.last_update_ms
    }

    /// True once a stream has been fully processed.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn tempo(&self) -> i32 {
        self.tempo
    }

    /// Sets the playback tempo in percent (100 = real time). Non-positive
    /// values are clamped to 1.
    pub fn set_tempo(&mut self, percent: i32) {
        if percent <= 0 {
            log::warn!("ignoring non-positive tempo {percent}, clamping to 1");
            self.tempo = 1;
        } else {
            self.tempo = percent;
        }
    }

    /// Decoded frames, in stream order.
    pub fn frames(&self) -> &[VideoFrame] {
        &self.frames
    }

    /// Per-frame skip flags; `skip_flags()[i]` is true when frame `i` is
    /// identical to frame `i - 1`.
    pub fn skip_flags(&self) -> &[bool] {
        &self.skip
    }

    /// Applies one command, returning whether it visibly changed the
    /// palette, framebuffer, or viewport.
    fn apply(&mut self, command: &CdgCommand) -> bool {
        match *command {
            CdgCommand::MemoryPreset { color, repeat } => {
                // The stream repeats memory presets up to 16 times for error
                // resilience; only the first of a run needs to draw.
                if self.last_was_memory_preset && repeat != 0 {
                    return false;
                }
                self.framebuffer.fill(color);
                true
            }
            CdgCommand::BorderPreset { color } => {
                self.framebuffer.fill_border(color);
                true
            }
            CdgCommand::TileBlock {
                mode,
                color0,
                color1,
                row,
                column,
                pixels,
            } => {
                self.framebuffer
                    .draw_tile(mode, color0, color1, row, column, &pixels);
                true
            }
            CdgCommand::Scroll {
                mode,
                color,
                h_cmd,
                h_offset,
                v_cmd,
                v_offset,
            } => {
                let fill = match mode {
                    ScrollMode::Preset => Some(color),
                    ScrollMode::Copy => None,
                };
                match h_cmd {
                    2 => self.framebuffer.scroll_left(fill),
                    1 => self.framebuffer.scroll_right(fill),
                    _ => {}
                }
                match v_cmd {
                    2 => self.framebuffer.scroll_up(fill),
                    1 => self.framebuffer.scroll_down(fill),
                    _ => {}
                }
                self.h_offset = h_offset;
                self.v_offset = v_offset;
                true
            }
            CdgCommand::DefineTransparent => {
                // Reserved opcode; not seen on commercial discs.
                log::info!("ignoring unsupported define-transparent command");
                false
            }
            CdgCommand::LoadColors { table, colors } => {
                let mut changed = false;
                for (i, &color) in colors.iter().enumerate() {
                    let index = table.base_index() + i;
                    if self.palette.entry(index) != color {
                        Arc::make_mut(&mut self.palette).set(index, color);
                        changed = true;
                    }
                }
                changed
            }
        }
    }

    /// Snapshots the safe area into the frame sequence at a 40 ms boundary.
    fn sample_frame(&mut self, changed: bool) {
        let mut pixels = vec![0u8; FRAME_WIDTH * FRAME_HEIGHT];
        self.framebuffer
            .copy_visible(self.h_offset, self.v_offset, &mut pixels);
        let start_time_ms = (self.frames.len() as u32 + 1) * FRAME_INTERVAL_MS;
        self.frames
            .push(VideoFrame::new(start_time_ms, pixels, Arc::clone(&self.palette)));
        self.skip.push(!changed);
    }

    /// Maps a playback timestamp to a frame index through the tempo factor.
    fn frame_index(&self, ms: u32) -> usize {
        let scaled = u64::from(ms) * self.tempo as u64 / 100;
        scaled.div_ceil(u64::from(FRAME_INTERVAL_MS)) as usize
    }
}
