//! Read/write RPG graph files from disk.

use crate::graph::Rpg;
use crate::schema;
use anyhow::{Context, Result};
use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};

const RPG_DIR: &str = ".rpg";
const RPG_FILE: &str = "graph.json";
const RPG_BACKUP_FILE: &str = "graph.backup.json";

/// Get the path to the RPG directory for a given project root.
pub fn rpg_dir(project_root: &Path) -> PathBuf {
    project_root.join(RPG_DIR)
}

/// Get the path to the RPG graph file for a given project root.
pub fn rpg_file(project_root: &Path) -> PathBuf {
    rpg_dir(project_root).join(RPG_FILE)
}

/// Check if an RPG exists for the given project root.
pub fn rpg_exists(project_root: &Path) -> bool {
    rpg_file(project_root).exists()
}

/// Get the path to the RPG backup file for a given project root.
pub fn rpg_backup_file(project_root: &Path) -> PathBuf {
    rpg_dir(project_root).join(RPG_BACKUP_FILE)
}

/// Create a backup of the current graph before destructive operations.
/// Returns the backup path if created, or None if no graph exists.
pub fn create_backup(project_root: &Path) -> Result<Option<PathBuf>> {
    if !rpg_exists(project_root) {
        return Ok(None);
    }

    let source = rpg_file(project_root);
    let dest = rpg_backup_file(project_root);

    fs::copy(&source, &dest).with_context(|| {
        format!(
            "failed to backup {} to {}",
            source.display(),
            dest.display()
        )
    })?;

    Ok(Some(dest))
}

/// Zstd magic bytes: 0x28 0xB5 0x2F 0xFD.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Load an RPG from disk.
/// Automatically detects zstd-compressed graph files by magic bytes.
pub fn load(project_root: &Path) -> Result<Rpg> {
    let path = rpg_file(project_root);
    let raw =
        fs::read(&path).with_context(|| format!("failed to read RPG from {}", path.display()))?;

    let json = if raw.len() >= 4 && raw[..4] == ZSTD_MAGIC {
        let mut decoder = zstd::Decoder::new(&raw[..]).context("failed to init zstd decoder")?;
        let mut decompressed = String::new();
        decoder
            .read_to_string(&mut decompressed)
            .context("failed to decompress graph.json")?;
        decompressed
    } else {
        String::from_utf8(raw).context("graph.json is not valid UTF-8")?
    };

    schema::from_json(&json)
}

/// Save an RPG to disk, uncompressed.
pub fn save(project_root: &Path, graph: &Rpg) -> Result<()> {
    save_with_compression(project_root, graph, false)
}

/// Save an RPG to disk, optionally zstd-compressed.
pub fn save_with_compression(project_root: &Path, graph: &Rpg, compress: bool) -> Result<()> {
    let dir = rpg_dir(project_root);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create RPG directory {}", dir.display()))?;

    let json = schema::to_json(graph)?;

    if compress {
        let compressed = zstd::encode_all(json.as_bytes(), 3)
            .context("failed to compress graph.json with zstd")?;
        fs::write(rpg_file(project_root), compressed)
            .with_context(|| "failed to write graph.json")?;
    } else {
        fs::write(rpg_file(project_root), json).with_context(|| "failed to write graph.json")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpgConfig;
    use crate::node::{LowLevelNode, NodeMetadata, SemanticFeature};

    fn sample() -> Rpg {
        let mut g = Rpg::new(RpgConfig {
            name: "sample".to_string(),
            root_path: String::new(),
            github: None,
        });
        g.add_low_level_node(LowLevelNode {
            id: "a.py:file".to_string(),
            feature: SemanticFeature::new("parse configuration values"),
            metadata: NodeMetadata::default(),
            source_code: None,
        });
        g
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let g = sample();
        save(tmp.path(), &g).unwrap();
        assert!(rpg_exists(tmp.path()));
        let loaded = load(tmp.path()).unwrap();
        assert_eq!(g, loaded);
    }

    #[test]
    fn test_compressed_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let g = sample();
        save_with_compression(tmp.path(), &g, true).unwrap();
        // Magic-byte detection decompresses transparently
        let loaded = load(tmp.path()).unwrap();
        assert_eq!(g, loaded);
    }

    #[test]
    fn test_backup() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(create_backup(tmp.path()).unwrap().is_none());
        save(tmp.path(), &sample()).unwrap();
        let backup = create_backup(tmp.path()).unwrap().unwrap();
        assert!(backup.exists());
    }
}
