//! # Presentation Pipeline
//!
//! Moves a finished frame to the display. The strategy is fixed when the
//! framebuffer is allocated:
//!
//! | Strategy          | Frame source       | Copy                        |
//! |-------------------|--------------------|-----------------------------|
//! | Direct            | video memory       | none                        |
//! | Double-buffered   | staging buffer     | async DMA or store queues   |
//! | Textured          | texture (+staging) | blocking DMA, then GPU quad |
//!
//! Waits on the DMA channel are unbounded busy-polls.

use crate::framebuffer::{CopyEngine, Framebuffer, Memory, StagingBuffer, TextureBacking, UvRect};
use crate::mode::TEXTURED_DISPLAY;
use crate::VideoResult;
use dcvideo_hal::cache::CacheControl;
use dcvideo_hal::dma::{DmaEngine, DmaTarget, TransferMode};
use dcvideo_hal::pvr::{pack_color, ListType, PowerVr, Vertex, CMD_VERTEX, CMD_VERTEX_EOL};
use dcvideo_hal::video::VideoOutput;
use dcvideo_hal::wait::spin_until;
use dcvideo_hal::{ConsoleHal, VirtAddr};

/// Present the current frame of `fb`
///
/// With `vertical_wait` the direct and double-buffered strategies wait
/// for vertical blank; the textured strategy waits for the GPU, which
/// becomes ready on the same boundary.
pub fn present<H: ConsoleHal>(hal: &H, fb: &Framebuffer, vertical_wait: bool) -> VideoResult<()> {
    match &fb.memory {
        Memory::Direct { .. } => {
            if vertical_wait {
                hal.video().wait_vblank();
            }
        }
        Memory::Staged { staging, vram, engine } => {
            if vertical_wait {
                hal.video().wait_vblank();
            }
            match engine {
                CopyEngine::Dma => {
                    dma_from_staging(hal, staging, *vram, DmaTarget::Vram32, TransferMode::Async)?
                }
                // SAFETY: the staging buffer is 64-byte aligned and holds
                // exactly one frame, which fits video memory at `vram`.
                CopyEngine::Cpu => unsafe {
                    hal.video().store_queue_copy(*vram, staging.addr(), staging.len())
                },
            }
        }
        Memory::Textured { texture, staging } => {
            if vertical_wait {
                hal.gpu().wait_ready();
            }
            if let Some(staging) = staging {
                dma_from_staging(
                    hal,
                    staging,
                    texture.addr(),
                    DmaTarget::Texture64,
                    TransferMode::Blocking,
                )?;
            }
            draw_quad(hal.gpu(), texture);
        }
    }
    Ok(())
}

/// Wait for any in-flight DMA transfer to finish
pub fn drain<H: ConsoleHal>(hal: &H) -> u64 {
    spin_until(|| hal.dma().is_ready())
}

fn dma_from_staging<H: ConsoleHal>(
    hal: &H,
    staging: &StagingBuffer,
    dst: VirtAddr,
    target: DmaTarget,
    mode: TransferMode,
) -> VideoResult<()> {
    hal.cache().flush_range(staging.addr(), staging.len());
    drain(hal);
    // SAFETY: the staging buffer was aligned for `target` when allocated
    // and has just been flushed. The channel is idle. The buffer outlives
    // the transfer because teardown drains the channel before releasing it.
    unsafe { hal.dma().transfer(staging.addr(), dst, staging.len(), target, mode)? };
    Ok(())
}

fn draw_quad<G: PowerVr>(gpu: &G, texture: &TextureBacking) {
    gpu.scene_begin();
    gpu.list_begin(ListType::OpaquePoly);
    gpu.submit_header(texture.header());
    for vertex in &fullscreen_quad(texture.uv()) {
        gpu.submit_vertex(vertex);
    }
    gpu.list_finish();
    gpu.scene_finish();
}

/// Strip covering the whole textured display, sampling `uv`
pub fn fullscreen_quad(uv: UvRect) -> [Vertex; 4] {
    let (w, h) = (TEXTURED_DISPLAY.0 as f32, TEXTURED_DISPLAY.1 as f32);
    let white = pack_color(1.0, 1.0, 1.0, 1.0);
    let corner = |flags, x, y, u, v| Vertex { flags, x, y, z: 1.0, u, v, argb: white, oargb: 0 };

    [
        corner(CMD_VERTEX, 0.0, 0.0, uv.u1, uv.v1),
        corner(CMD_VERTEX, w, 0.0, uv.u2, uv.v1),
        corner(CMD_VERTEX, 0.0, h, uv.u1, uv.v2),
        corner(CMD_VERTEX_EOL, w, h, uv.u2, uv.v2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::{allocate, AllocRequest, WindowRequest};
    use crate::mode::{DisplayCategory, DisplayMode};
    use crate::VideoError;
    use dcvideo_hal::sim::{SimConsole, SimOp};
    use dcvideo_hal::video::VRAM_BASE;
    use dcvideo_hal::HalError;

    fn mode_640() -> DisplayMode {
        DisplayMode::resolve(DisplayCategory::Ntsc, 640, 480, 16).unwrap()
    }

    fn staged(engine: CopyEngine) -> AllocRequest {
        AllocRequest { double_buffered: true, engine, window: None }
    }

    fn textured(double_buffered: bool) -> AllocRequest {
        AllocRequest {
            double_buffered,
            engine: CopyEngine::Dma,
            window: Some(WindowRequest { logical: (100, 50), bpp: 16 }),
        }
    }

    #[test]
    fn test_direct_only_waits() {
        let sim = SimConsole::new();
        let direct = AllocRequest { double_buffered: false, engine: CopyEngine::Dma, window: None };
        let fb = allocate(&sim, &mode_640(), &direct).unwrap();

        present(&sim, &fb, false).unwrap();
        assert!(sim.take_ops().is_empty());

        present(&sim, &fb, true).unwrap();
        assert_eq!(sim.take_ops(), vec![SimOp::WaitVblank]);
    }

    #[test]
    fn test_staged_dma_flushes_then_kicks() {
        let sim = SimConsole::new();
        sim.dma().init().unwrap();
        let fb = allocate(&sim, &mode_640(), &staged(CopyEngine::Dma)).unwrap();
        let src = fb.pixels();
        sim.take_ops();

        present(&sim, &fb, true).unwrap();
        assert_eq!(
            sim.take_ops(),
            vec![
                SimOp::WaitVblank,
                SimOp::CacheFlush { start: src, len: 640 * 480 * 2 },
                SimOp::DmaTransfer {
                    src,
                    dst: VRAM_BASE,
                    len: 640 * 480 * 2,
                    target: DmaTarget::Vram32,
                    mode: TransferMode::Async,
                },
            ]
        );
        assert!(sim.dma_busy());

        // The next frame waits out the transfer in flight.
        present(&sim, &fb, false).unwrap();
        assert!(sim.violations().is_empty());
        assert_eq!(drain(&sim), 3);
        assert!(!sim.dma_busy());
        fb.release(&sim);
    }

    #[test]
    fn test_staged_dma_requires_init() {
        let sim = SimConsole::new();
        let fb = allocate(&sim, &mode_640(), &staged(CopyEngine::Dma)).unwrap();
        assert_eq!(
            present(&sim, &fb, false),
            Err(VideoError::Hardware(HalError::NotInitialized))
        );
    }

    #[test]
    fn test_staged_cpu_copy() {
        let sim = SimConsole::new();
        let fb = allocate(&sim, &mode_640(), &staged(CopyEngine::Cpu)).unwrap();

        present(&sim, &fb, false).unwrap();
        assert_eq!(
            sim.take_ops(),
            vec![SimOp::StoreQueueCopy { dst: VRAM_BASE, src: fb.pixels(), len: 640 * 480 * 2 }]
        );
        assert!(sim.violations().is_empty());
    }

    #[test]
    fn test_textured_draws_quad() {
        let sim = SimConsole::new();
        sim.gpu().init_defaults().unwrap();
        let fb = allocate(&sim, &mode_640(), &textured(false)).unwrap();
        let texture = fb.texture().unwrap();
        sim.take_ops();

        present(&sim, &fb, true).unwrap();
        let mut expected = vec![
            SimOp::GpuWaitReady,
            SimOp::SceneBegin,
            SimOp::ListBegin(ListType::OpaquePoly),
            SimOp::Header(*texture.header()),
        ];
        expected.extend(fullscreen_quad(texture.uv()).into_iter().map(SimOp::Vertex));
        expected.extend([SimOp::ListFinish, SimOp::SceneFinish]);
        assert_eq!(sim.take_ops(), expected);
        assert!(sim.violations().is_empty());
        fb.release(&sim);
    }

    #[test]
    fn test_textured_staging_uploads_before_scene() {
        let sim = SimConsole::new();
        sim.gpu().init_defaults().unwrap();
        sim.dma().init().unwrap();
        let fb = allocate(&sim, &mode_640(), &textured(true)).unwrap();
        let (src, dst) = (fb.pixels(), fb.texture().unwrap().addr());
        sim.take_ops();

        present(&sim, &fb, false).unwrap();
        let ops = sim.take_ops();
        assert_eq!(ops[0], SimOp::CacheFlush { start: src, len: 128 * 64 * 2 });
        assert_eq!(
            ops[1],
            SimOp::DmaTransfer {
                src,
                dst,
                len: 128 * 64 * 2,
                target: DmaTarget::Texture64,
                mode: TransferMode::Blocking,
            }
        );
        assert_eq!(ops[2], SimOp::SceneBegin);
        assert_eq!(ops.last(), Some(&SimOp::SceneFinish));
        assert!(!sim.dma_busy());
        assert!(sim.violations().is_empty());
        fb.release(&sim);
    }

    #[test]
    fn test_fullscreen_quad() {
        let uv = UvRect::for_window((100, 50), (128, 64));
        let quad = fullscreen_quad(uv);

        let corners: Vec<_> = quad.iter().map(|v| (v.x, v.y, v.u, v.v)).collect();
        assert_eq!(
            corners,
            vec![
                (0.0, 0.0, uv.u1, uv.v1),
                (640.0, 0.0, uv.u2, uv.v1),
                (0.0, 480.0, uv.u1, uv.v2),
                (640.0, 480.0, uv.u2, uv.v2),
            ]
        );
        assert!(quad[..3].iter().all(|v| v.flags == CMD_VERTEX));
        assert_eq!(quad[3].flags, CMD_VERTEX_EOL);
        assert!(quad.iter().all(|v| v.z == 1.0 && v.argb == 0xffff_ffff));
    }
}
