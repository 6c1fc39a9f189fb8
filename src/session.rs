//! Whole-history session archives.
//!
//! A session is a `.tar.zst` file holding `manifest.json` and one PNG per
//! operation under `images/`. It is staged in a temporary working directory
//! before packing, and unpacked into one when read back.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use image::GenericImageView;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder};
use tempdir::TempDir;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

use crate::history::History;
use crate::models::Operation;
use crate::operators::contours::contour_from_points;

const MANIFEST_FILE_NAME: &str = "manifest.json";
const IMAGE_DIR_NAME: &str = "images";
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    exported_at: String,
    selected: Option<usize>,
    operations: Vec<OperationEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OperationEntry {
    id: Uuid,
    name: String,
    image: String,
    created_at: String,
    channels: u8,
    width: u32,
    height: u32,
    #[serde(default)]
    contours: Vec<ContourEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContourEntry {
    points: Vec<[i32; 2]>,
    area: f64,
    perimeter: f64,
}

fn image_file_name(id: Uuid) -> String {
    format!("{id}.png")
}

/// Resolve a manifest image entry, which must be a bare file name inside `images/`
fn image_entry_path(images_dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(images_dir.join(name)),
        _ => anyhow::bail!("Corrupt session: image entry {name:?} is not a plain file name"),
    }
}

fn entry_for(operation: &Operation) -> anyhow::Result<OperationEntry> {
    let (width, height) = operation.dimensions();
    Ok(OperationEntry {
        id: operation.id(),
        name: operation.name().to_string(),
        image: image_file_name(operation.id()),
        created_at: operation.created_at().format(&Rfc3339)?,
        channels: operation.channels(),
        width,
        height,
        contours: operation
            .contours()
            .iter()
            .map(|c| ContourEntry {
                points: c.points.iter().map(|p| [p.x, p.y]).collect(),
                area: c.area,
                perimeter: c.perimeter,
            })
            .collect(),
    })
}

/// Write every operation of `history` into a `.tar.zst` session archive
pub fn export(history: &History, session_file: impl AsRef<Path>) -> anyhow::Result<()> {
    let session_file = session_file.as_ref();
    let working_dir = TempDir::new("cvlab_session")?;
    let images_dir = working_dir.path().join(IMAGE_DIR_NAME);
    fs::create_dir_all(&images_dir)?;

    let mut operations = Vec::with_capacity(history.len());
    for operation in history.iter() {
        let entry = entry_for(operation)?;
        let image_path = images_dir.join(&entry.image);
        operation
            .image()
            .save(&image_path)
            .with_context(|| format!("Failed to write session image {:?}", image_path))?;
        operations.push(entry);
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        exported_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
        selected: history.selected_index(),
        operations,
    };
    let manifest_path = working_dir.path().join(MANIFEST_FILE_NAME);
    let mut writer = BufWriter::new(
        File::create(&manifest_path).with_context(|| format!("Failed to create {:?}", manifest_path))?,
    );
    serde_json::to_writer_pretty(&mut writer, &manifest)?;
    writer.flush()?;

    if let Some(parent) = session_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let out = File::create(session_file)
        .with_context(|| format!("Failed to create session archive {:?}", session_file))?;

    // zstd encoder wrapping the output file
    let encoder = ZstdEncoder::new(out, 3)
        .with_context(|| format!("Failed to create zstd encoder for {:?}", session_file))?;

    // tar builder wrapping the encoder
    let mut tar = Builder::new(encoder);
    tar.append_dir_all(".", working_dir.path())
        .with_context(|| format!("Failed to add {:?} to tar", working_dir.path()))?;

    // Finish tar, then finish zstd stream
    let encoder = tar
        .into_inner()
        .with_context(|| format!("Failed to finalize tar for {:?}", session_file))?;
    encoder
        .finish()
        .with_context(|| format!("Failed to finalize zstd stream for {:?}", session_file))?;

    tracing::info!(path = %session_file.display(), operations = history.len(), "session exported");
    Ok(())
}

/// Read a session archive back into a history, keeping ids, names, timestamps and selection
pub fn import(session_file: impl AsRef<Path>) -> anyhow::Result<History> {
    let session_file = session_file.as_ref();
    let working_dir = TempDir::new("cvlab_session")?;

    {
        let f = File::open(session_file)
            .with_context(|| format!("Failed to open session archive {:?}", session_file))?;
        let decoder = ZstdDecoder::new(f).with_context(|| format!("Invalid zstd stream in {:?}", session_file))?;
        let mut archive = Archive::new(decoder);
        archive.unpack(working_dir.path()).with_context(|| {
            format!(
                "Failed to extract archive {:?} into {:?}",
                session_file,
                working_dir.path()
            )
        })?;
    }

    let manifest_path = working_dir.path().join(MANIFEST_FILE_NAME);
    let images_dir = working_dir.path().join(IMAGE_DIR_NAME);
    match (manifest_path.is_file(), images_dir.is_dir()) {
        (true, true) => {}
        (false, _) => anyhow::bail!("Corrupt session: manifest missing in {:?}", session_file),
        (true, false) => anyhow::bail!("Corrupt session: images dir missing in {:?}", session_file),
    }

    let text = fs::read_to_string(&manifest_path)?;
    let manifest: Manifest =
        serde_json::from_str(&text).with_context(|| format!("Invalid manifest in {:?}", session_file))?;
    if manifest.version != MANIFEST_VERSION {
        anyhow::bail!(
            "Unsupported session version {} (expected {})",
            manifest.version,
            MANIFEST_VERSION
        );
    }

    let mut operations = Vec::with_capacity(manifest.operations.len());
    for entry in manifest.operations {
        let image_path = image_entry_path(&images_dir, &entry.image)?;
        let image = image::open(&image_path)
            .with_context(|| format!("Failed to open session image {:?}", image_path))?;
        let created_at = OffsetDateTime::parse(&entry.created_at, &Rfc3339)
            .with_context(|| format!("Invalid timestamp for operation {}", entry.name))?;
        let (width, height) = image.dimensions();
        let contours = entry
            .contours
            .iter()
            .filter_map(|c| {
                let points = c.points.iter().map(|&[x, y]| Point::new(x, y)).collect();
                contour_from_points(points, width, height)
            })
            .collect();
        operations.push(Operation::restore(entry.id, entry.name, image, contours, created_at));
    }

    tracing::info!(path = %session_file.display(), operations = operations.len(), "session imported");
    Ok(History::restore(operations, manifest.selected))
}
