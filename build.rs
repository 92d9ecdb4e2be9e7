use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    // Rerun when anything below /asset/ changes.
    println!("cargo:rerun-if-changed=asset/*");

    let out_dir = env::var("OUT_DIR")?;
    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let asset_src = manifest_dir.join("asset");
    if !asset_src.exists() {
        return Ok(());
    }
    // The decoded asset cache is machine local.
    let entries = std::fs::read_dir(&asset_src)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.file_name().is_some_and(|name| name != "cache"))
        .collect::<Vec<_>>();
    let staged = PathBuf::from(out_dir).join("asset");
    std::fs::create_dir_all(&staged)?;
    copy_items(&entries, &staged, &copy_options)?;

    Ok(())
}
