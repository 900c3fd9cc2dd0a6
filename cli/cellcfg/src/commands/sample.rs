//! `cellcfg sample`: write the J7200 reference descriptors.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cellcfg_core::{fixture, to_bytes};

pub fn run(out_dir: &Path) -> Result<()> {
    for path in write_samples(out_dir)? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Write the root cell and the Linux demo cell as `<name>.cell`, root first.
pub fn write_samples(out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let mut written = Vec::new();
    for cell in [fixture::j7200_root_cell(), fixture::j7200_linux_demo()] {
        let path = out_dir.join(format!("{}.cell", cell.name));
        let bytes = to_bytes(&cell).with_context(|| format!("encoding '{}'", cell.name))?;
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellcfg_core::parse;

    #[test]
    fn samples_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_samples(&dir.path().join("out")).unwrap();
        assert!(written[0].ends_with("k3-j7200-evm.cell"));

        let demo = parse(&fs::read(&written[1]).unwrap()).unwrap();
        assert_eq!(demo, fixture::j7200_linux_demo());
    }
}
