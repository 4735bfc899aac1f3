//! Demo: a 2×2 colored plane eight units in front of a spinning camera.
//!
//! Drag with the left mouse button to turn the plane. `RUST_LOG=debug` shows
//! buffer creation and context events.

use xsthree::{
    AppConfig, CameraParams, FrameBinding, LoggingConfig, Scene, Vec3, init_logging,
    run_with_config, shapes,
};

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let config = AppConfig::new().title("xsthree").size(500, 500);

    run_with_config(config, |ctx| {
        let camera = ctx.camera(CameraParams::new());
        {
            let mut camera = camera.borrow_mut();
            camera.transform.position = Vec3::new(0.0, 0.0, -8.0);
            camera.transform.rotation = Vec3::Y;
        }

        let mut scene = Scene::new("demo");
        if let Err(err) = scene.add_object(shapes::plane(2.0, 2.0)) {
            log::error!("demo plane rejected: {err}");
        }

        FrameBinding::new(scene.into_shared(), camera, |stats| {
            if stats.frame % 600 == 0 {
                log::info!(
                    "frame {}: {} draws, spin {:.2} rad",
                    stats.frame,
                    stats.draw_calls,
                    stats.rotation
                );
            }
        })
    })
    .map_err(|err| anyhow::anyhow!("renderer exited with an error: {err}"))?;

    Ok(())
}
