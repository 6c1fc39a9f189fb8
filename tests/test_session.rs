//! Integration tests for session archives.
//!
//! Tests cover:
//! - Export/import preserving names, ids, timestamps, pixels and selection
//! - Contours surviving the round trip
//! - Rejecting files that are not session archives
//! - Rejecting manifests with another version or escaping image paths

mod common;

use std::fs::File;
use std::path::Path;

use cvlab::session;

use common::*;

#[test]
fn test_session_round_trip() -> anyhow::Result<()> {
    // 1. Build a short history
    let img_file = create_shapes_image();
    let mut history = load_history(&img_file);
    history.apply(&"convert_color:code=RGB2GRAY".parse::<OperatorSpec>()?)?;
    history.apply(&"find_contours".parse::<OperatorSpec>()?)?;
    history.select(1)?;

    // 2. Export and import
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("nested").join("session.tar.zst");
    session::export(&history, &path)?;
    assert!(path.is_file());
    let restored = session::import(&path)?;

    // 3. Same operations in the same order
    assert_eq!(restored.len(), history.len());
    assert_eq!(restored.selected_index(), Some(1));
    for (a, b) in history.iter().zip(restored.iter()) {
        assert_eq!(a.id(), b.id());
        assert_eq!(a.name(), b.name());
        assert_eq!(a.created_at(), b.created_at());
        assert_eq!(a.channels(), b.channels());
        assert_eq!(a.image().as_bytes(), b.image().as_bytes());
    }

    // 4. Contours are rebuilt from their points
    let original = history.get(2).expect("contour result").contours();
    let rebuilt = restored.get(2).expect("contour result").contours();
    assert_eq!(rebuilt.len(), original.len());
    for (a, b) in original.iter().zip(rebuilt) {
        assert_eq!(a.points, b.points);
        assert_eq!(a.bounding_rect, b.bounding_rect);
        assert_eq!(a.area, b.area);
        assert_eq!(a.mask, b.mask);
    }
    Ok(())
}

#[test]
fn test_empty_history_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("empty.tar.zst");
    session::export(&History::new(), &path)?;

    let restored = session::import(&path)?;
    assert!(restored.is_empty());
    assert_eq!(restored.selected_index(), None);
    Ok(())
}

#[test]
fn test_import_rejects_non_archives() -> anyhow::Result<()> {
    let img_file = create_test_image();
    assert!(session::import(img_file.path()).is_err());
    assert!(session::import("/no/such/session.tar.zst").is_err());
    Ok(())
}

/// Pack `dir` the way session archives are packed
fn pack_dir(dir: &Path, out: &Path) -> anyhow::Result<()> {
    let encoder = zstd::stream::write::Encoder::new(File::create(out)?, 3)?;
    let mut tar = tar::Builder::new(encoder);
    tar.append_dir_all(".", dir)?;
    tar.into_inner()?.finish()?;
    Ok(())
}

/// A staged session with one gray image at the archive root and `manifest`
fn stage_session(manifest: serde_json::Value) -> anyhow::Result<tempfile::TempDir> {
    let staging = tempfile::TempDir::new()?;
    std::fs::create_dir_all(staging.path().join("images"))?;
    image::GrayImage::new(2, 2).save(staging.path().join("outside.png"))?;
    std::fs::write(staging.path().join("manifest.json"), serde_json::to_vec(&manifest)?)?;
    Ok(staging)
}

#[test]
fn test_import_rejects_other_versions() -> anyhow::Result<()> {
    let staging = stage_session(serde_json::json!({
        "version": 2,
        "exported_at": "2026-01-01T00:00:00Z",
        "selected": null,
        "operations": []
    }))?;
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("future.tar.zst");
    pack_dir(staging.path(), &path)?;

    let err = session::import(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Unsupported session version 2"));
    Ok(())
}

#[test]
fn test_import_rejects_image_paths_outside_images_dir() -> anyhow::Result<()> {
    let staging = stage_session(serde_json::json!({
        "version": 1,
        "exported_at": "2026-01-01T00:00:00Z",
        "selected": 0,
        "operations": [{
            "id": "00000000-0000-0000-0000-000000000001",
            "name": "outside.png",
            "image": "../outside.png",
            "created_at": "2026-01-01T00:00:00Z",
            "channels": 1,
            "width": 2,
            "height": 2
        }]
    }))?;
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("escape.tar.zst");
    pack_dir(staging.path(), &path)?;

    let err = session::import(&path).unwrap_err();
    assert!(format!("{err:#}").contains("not a plain file name"));
    Ok(())
}
