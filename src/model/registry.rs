//! The model registry owns one lazily-loaded handle per analysis kind. A load
//! is attempted at most once per process: success and failure are both
//! cached, and concurrent first callers wait for the single attempt.

use super::{Backend, BackendFactory, ModelKind};
use crate::config::ModelSettings;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loaded,
    Failed,
}

/// The outcome of the one load attempt for a kind
pub struct ModelHandle {
    backend: Option<Arc<dyn Backend>>,
    path: Option<PathBuf>,
    error: Option<String>,
}

impl Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ModelHandle {{ state: {:?}, path: {:?}, error: {:?} }}",
            self.state(),
            self.path,
            self.error
        )
    }
}

impl ModelHandle {
    pub fn state(&self) -> ModelState {
        match self.backend {
            Some(_) => ModelState::Loaded,
            None => ModelState::Failed,
        }
    }

    pub fn backend(&self) -> Option<&Arc<dyn Backend>> {
        self.backend.as_ref()
    }

    /// The weights path that was found, or the first one tried
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Diagnostic view of a handle, served by the status endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub model_path: Option<String>,
    pub load_error: Option<String>,
}

/// Weights locations for `kind`, in the order they are tried: the explicit
/// override, the conventional location under the install root, then the
/// fallbacks relative to the root's parent and the working directory.
pub fn candidate_paths(kind: ModelKind, settings: &ModelSettings) -> Vec<PathBuf> {
    let file = kind.weights_file();
    let overridden = match kind {
        ModelKind::Vegetation => settings.vegetation.clone(),
        ModelKind::SoilDetection => settings.soil_detection.clone(),
        ModelKind::SoilClassifier => settings.soil_classifier.clone(),
    };

    let mut paths: Vec<PathBuf> = overridden.into_iter().collect();
    paths.push(settings.root.join("models").join("weights").join(file));

    // The classifier also accepts its base path without an extension
    if kind == ModelKind::SoilClassifier {
        let bare = paths[0].with_extension("");
        paths.insert(1, bare);
    }

    paths.push(settings.root.join("..").join("models").join("weights").join(file));
    paths.push(Path::new("models").join("weights").join(file));
    paths.push(PathBuf::from(file));

    let mut unique: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}

pub struct ModelRegistry {
    settings: ModelSettings,
    factory: Arc<dyn BackendFactory>,
    slots: [OnceCell<ModelHandle>; 3],
}

impl Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("settings", &self.settings)
            .field("slots", &self.slots)
            .finish()
    }
}

impl ModelRegistry {
    pub fn new(settings: ModelSettings, factory: Arc<dyn BackendFactory>) -> Self {
        ModelRegistry {
            settings,
            factory,
            slots: Default::default(),
        }
    }

    /// Get the handle for `kind`, loading it on first use
    pub fn get(&self, kind: ModelKind) -> &ModelHandle {
        self.slots[kind.index()].get_or_init(|| self.load(kind))
    }

    /// Report on `kind` without triggering a load
    pub fn status(&self, kind: ModelKind) -> ModelStatus {
        match self.slots[kind.index()].get() {
            None => ModelStatus {
                model_loaded: false,
                model_path: None,
                load_error: None,
            },
            Some(handle) => ModelStatus {
                model_loaded: handle.state() == ModelState::Loaded,
                model_path: handle.path().map(|p| p.display().to_string()),
                load_error: handle.error().map(String::from),
            },
        }
    }

    pub fn state(&self, kind: ModelKind) -> ModelState {
        self.slots[kind.index()]
            .get()
            .map(ModelHandle::state)
            .unwrap_or(ModelState::Unloaded)
    }

    fn load(&self, kind: ModelKind) -> ModelHandle {
        let candidates = candidate_paths(kind, &self.settings);
        let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());

        let Some(found) = candidates.iter().find(|p| p.exists()) else {
            let tried = candidates
                .iter()
                .map(|p| absolute(p).display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let error = format!("{kind} model not found in any location (tried: {tried})");
            warn!("{error}");
            return ModelHandle {
                backend: None,
                path: candidates.first().map(|p| absolute(p)),
                error: Some(error),
            };
        };

        let path = absolute(found);
        info!("loading {kind} model from {}", path.display());
        match self.factory.load(kind, &path) {
            Ok(backend) => {
                info!("{kind} model loaded ({})", backend.engine());
                ModelHandle {
                    backend: Some(backend),
                    path: Some(path),
                    error: None,
                }
            }
            Err(e) => {
                warn!("failed to load {kind} model from {}: {e:#}", path.display());
                ModelHandle {
                    backend: None,
                    path: Some(path),
                    error: Some(format!("{e:#}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Prediction;
    use crate::testutil::{weights_file, FakeFactory, FixedBackend};
    use std::sync::atomic::Ordering;

    fn settings_with(kind: ModelKind, path: Option<PathBuf>) -> ModelSettings {
        let mut settings = ModelSettings {
            root: PathBuf::from("/nonexistent/archaimap"),
            ..Default::default()
        };
        match kind {
            ModelKind::Vegetation => settings.vegetation = path,
            ModelKind::SoilDetection => settings.soil_detection = path,
            ModelKind::SoilClassifier => settings.soil_classifier = path,
        }
        settings
    }

    #[test]
    fn test_candidate_order() {
        let settings = settings_with(ModelKind::Vegetation, Some("/opt/veg.pt".into()));
        let paths = candidate_paths(ModelKind::Vegetation, &settings);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/opt/veg.pt"),
                PathBuf::from("/nonexistent/archaimap/models/weights/vegetation_best.pt"),
                PathBuf::from("/nonexistent/archaimap/../models/weights/vegetation_best.pt"),
                PathBuf::from("models/weights/vegetation_best.pt"),
                PathBuf::from("vegetation_best.pt"),
            ]
        );
    }

    #[test]
    fn test_classifier_tries_bare_path() {
        let settings = settings_with(ModelKind::SoilClassifier, None);
        let paths = candidate_paths(ModelKind::SoilClassifier, &settings);
        assert_eq!(
            paths[..2],
            [
                PathBuf::from("/nonexistent/archaimap/models/weights/soil_classifier.pt"),
                PathBuf::from("/nonexistent/archaimap/models/weights/soil_classifier"),
            ]
        );
    }

    #[test]
    fn test_status_before_first_use() {
        let registry = ModelRegistry::new(
            settings_with(ModelKind::Vegetation, None),
            Arc::new(FakeFactory::failing()),
        );
        assert_eq!(registry.state(ModelKind::Vegetation), ModelState::Unloaded);
        assert_eq!(
            registry.status(ModelKind::Vegetation),
            ModelStatus {
                model_loaded: false,
                model_path: None,
                load_error: None
            }
        );
    }

    #[test]
    fn test_missing_weights_never_calls_factory() {
        let factory = Arc::new(FakeFactory::failing());
        let registry = ModelRegistry::new(
            settings_with(ModelKind::SoilDetection, None),
            factory.clone(),
        );
        let handle = registry.get(ModelKind::SoilDetection);
        assert_eq!(handle.state(), ModelState::Failed);
        assert!(handle.error().unwrap().contains("not found in any location"));
        assert!(handle.path().is_some());
        assert_eq!(factory.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_load_failure_is_sticky() {
        let path = weights_file("sticky_soil.pt");
        let factory = Arc::new(FakeFactory::failing());
        let registry = ModelRegistry::new(
            settings_with(ModelKind::SoilDetection, Some(path)),
            factory.clone(),
        );
        for _ in 0..3 {
            assert_eq!(registry.get(ModelKind::SoilDetection).state(), ModelState::Failed);
        }
        assert_eq!(factory.loads.load(Ordering::SeqCst), 1);

        let status = registry.status(ModelKind::SoilDetection);
        assert!(!status.model_loaded);
        assert!(status.model_path.unwrap().ends_with("sticky_soil.pt"));
        assert_eq!(status.load_error.as_deref(), Some("corrupt weights file"));
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let path = weights_file("concurrent_veg.pt");
        let factory = Arc::new(FakeFactory::serving(FixedBackend(Prediction::default())));
        let registry = ModelRegistry::new(
            settings_with(ModelKind::Vegetation, Some(path)),
            factory.clone(),
        );
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    assert_eq!(registry.get(ModelKind::Vegetation).state(), ModelState::Loaded);
                });
            }
        });
        assert_eq!(factory.loads.load(Ordering::SeqCst), 1);
        assert!(registry.status(ModelKind::Vegetation).model_loaded);
        // other kinds are untouched
        assert_eq!(registry.state(ModelKind::SoilClassifier), ModelState::Unloaded);
    }
}
