use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::RecordKind;

/// Every filesystem location a run touches, resolved up front.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub report_inputs: Vec<PathBuf>,
    pub chemical_inputs: Vec<PathBuf>,
    pub reports_file: PathBuf,
    pub chemicals_file: PathBuf,
    pub blended_file: PathBuf,
    pub sqlite_db: PathBuf,
}

impl StoragePaths {
    pub fn resolve(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let source_dir = expand_path(&config.source_dir)?;
        let target_dir = expand_path(&config.target_dir)?;
        let names = &config.output_names;

        let paths = Self {
            report_inputs: join_all(&source_dir, &config.report_files),
            chemical_inputs: join_all(&source_dir, &config.chemical_files),
            reports_file: target_dir.join(&names.reports_file),
            chemicals_file: target_dir.join(&names.chemicals_file),
            blended_file: target_dir.join(&names.blended_file),
            sqlite_db: target_dir.join(&names.sqlite_db),
            source_dir,
            target_dir,
        };
        paths.check_inputs_disjoint_from_outputs()?;
        Ok(paths)
    }

    /// The purge must never be able to delete a source file.
    fn check_inputs_disjoint_from_outputs(&self) -> Result<(), PipelineError> {
        let artifacts = self.output_artifacts();
        for input in self.report_inputs.iter().chain(&self.chemical_inputs) {
            if artifacts.contains(input) {
                return Err(PipelineError::InvalidConfig(format!(
                    "input {} is also an output artifact of the run",
                    input.display()
                )));
            }
        }
        Ok(())
    }

    pub fn inputs(&self, kind: RecordKind) -> &[PathBuf] {
        match kind {
            RecordKind::Report => &self.report_inputs,
            RecordKind::Chemical => &self.chemical_inputs,
        }
    }

    pub fn intermediate(&self, kind: RecordKind) -> &Path {
        match kind {
            RecordKind::Report => &self.reports_file,
            RecordKind::Chemical => &self.chemicals_file,
        }
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.target_dir.join("manifests")
    }

    /// Fails on the first declared input that is not a readable file.
    pub fn verify_inputs(&self) -> Result<(), PipelineError> {
        for kind in [RecordKind::Report, RecordKind::Chemical] {
            for path in self.inputs(kind) {
                info!(kind = kind.as_str(), path = %path.display(), "checking input file");
                if !path.is_file() {
                    return Err(PipelineError::MissingInput {
                        kind: kind.as_str(),
                        path: path.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn ensure_target_dir(&self) -> Result<(), PipelineError> {
        if !self.target_dir.exists() {
            info!(path = %self.target_dir.display(), "creating target folder");
        }
        fs::create_dir_all(&self.target_dir)
            .map_err(|source| PipelineError::io(&self.target_dir, source))
    }

    /// Output artifacts a run produces, including sqlite side files.
    pub fn output_artifacts(&self) -> Vec<PathBuf> {
        let mut artifacts = vec![
            self.reports_file.clone(),
            self.chemicals_file.clone(),
            self.blended_file.clone(),
            self.sqlite_db.clone(),
        ];
        for suffix in ["-journal", "-wal", "-shm"] {
            let mut side = self.sqlite_db.clone().into_os_string();
            side.push(suffix);
            artifacts.push(PathBuf::from(side));
        }
        artifacts
    }

    /// Deletes every prior output artifact, returning the ones that existed.
    pub fn purge_outputs(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let mut removed = Vec::new();
        for path in self.output_artifacts() {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "removed prior output");
                    removed.push(path);
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove prior output");
                    return Err(PipelineError::io(path, err));
                }
            }
        }
        Ok(removed)
    }
}

fn join_all(dir: &Path, names: &[String]) -> Vec<PathBuf> {
    names.iter().map(|name| dir.join(name)).collect()
}

/// Expands a leading `~` and makes the path absolute without touching disk.
pub fn expand_path(path: &Path) -> Result<PathBuf, PipelineError> {
    let expanded = match path.components().next() {
        Some(Component::Normal(first)) if first == "~" => {
            let home = dirs::home_dir().ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "cannot expand {}: home directory is unknown",
                    path.display()
                ))
            })?;
            home.join(path.components().skip(1).collect::<PathBuf>())
        }
        _ => path.to_path_buf(),
    };

    std::path::absolute(&expanded).map_err(|source| PipelineError::io(expanded, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_resolves_home_prefix() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let expanded = expand_path(Path::new("~/fracking/SkyTruth")).unwrap();
        assert_eq!(expanded, home.join("fracking").join("SkyTruth"));
    }

    #[test]
    fn purge_removes_existing_outputs_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            source_dir: dir.path().to_path_buf(),
            target_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let paths = StoragePaths::resolve(&config).unwrap();
        fs::write(&paths.blended_file, "stale").unwrap();
        fs::write(&paths.sqlite_db, "stale").unwrap();
        let unrelated = dir.path().join("keep.txt");
        fs::write(&unrelated, "keep").unwrap();

        let removed = paths.purge_outputs().unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!paths.blended_file.exists());
        assert!(!paths.sqlite_db.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn input_sharing_an_output_path_is_rejected_before_any_purge() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            source_dir: dir.path().to_path_buf(),
            target_dir: dir.path().to_path_buf(),
            report_files: vec!["rprtFile.txt".to_string()],
            chemical_files: vec!["chemicals.txt".to_string()],
            ..PipelineConfig::default()
        };
        let source = dir.path().join("rprtFile.txt");
        fs::write(&source, "pdf_seqid\n1\n").unwrap();

        match StoragePaths::resolve(&config) {
            Err(PipelineError::InvalidConfig(message)) => {
                assert!(message.contains("rprtFile.txt"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(source.exists());
    }

    #[test]
    fn verify_inputs_reports_the_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            source_dir: dir.path().to_path_buf(),
            target_dir: dir.path().join("out"),
            report_files: vec!["r.txt".to_string()],
            chemical_files: vec!["c.txt".to_string()],
            ..PipelineConfig::default()
        };
        fs::write(dir.path().join("r.txt"), "pdf_seqid\n").unwrap();
        let paths = StoragePaths::resolve(&config).unwrap();

        match paths.verify_inputs() {
            Err(PipelineError::MissingInput { kind, path }) => {
                assert_eq!(kind, "chemical");
                assert!(path.ends_with("c.txt"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
