/// Example: Render the mask headless in every shading mode and save PNGs
///
/// Usage: cargo run --example render_frames -- [path/to/mask.obj] [out_dir]

use mask_core::synthetic::SwayingHead;
use mask_core::{Command, Config, MaskSession, ShadingMode};
use std::env;
use std::path::PathBuf;

fn main() -> mask_core::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut config = Config::default();
    if let Some(mesh) = args.get(1) {
        config.mesh.path = PathBuf::from(mesh);
    }
    let out_dir = PathBuf::from(args.get(2).map(String::as_str).unwrap_or("frames"));
    std::fs::create_dir_all(&out_dir)?;

    let mut session = MaskSession::new(config.clone())?;
    let head = SwayingHead::new(session.mesh(), &config);

    for mode in ShadingMode::ALL {
        session.apply(Command::SelectShading(mode))?;
        // Let the camera settle before saving
        for i in 0..15 {
            session.process_frame(Some(&head.frame_at(i * 33)), None)?;
        }
        let path = out_dir.join(format!("mask_{}.png", mode.name()));
        session.frame().save(&path)?;
        println!("Saved {}", path.display());
    }

    let stats = session.stats();
    println!(
        "{} frames rendered, {} triangles drawn in the last frame",
        stats.rendered, stats.last_raster.drawn
    );
    Ok(())
}
