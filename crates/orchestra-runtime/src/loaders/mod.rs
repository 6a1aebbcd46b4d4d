//! Discovery sources.
//!
//! | Loader | Source |
//! |--------|--------|
//! | [`SectionLoader`] | identifier sections of the loaded images |
//! | [`ModuleLoader`] | `discovery.modules` |
//! | [`ManifestLoader`] | `[[services]]` |
//! | [`StaticLoader`] | a fixed list supplied by the host |

mod manifest;
mod module;
mod section;

use std::sync::Arc;

pub use manifest::ManifestLoader;
pub use module::ModuleLoader;
pub use orchestra_core::StaticLoader;
pub use section::SectionLoader;

use orchestra_core::{ScanOptions, ServiceLoader};

use crate::config::OrchestratorConfig;

/// Builds the loaders enabled by `config`, in bootstrap order.
pub fn from_config(config: &OrchestratorConfig) -> Vec<Arc<dyn ServiceLoader>> {
    let discovery = &config.discovery;
    let options = ScanOptions {
        restrict_to_app_dir: discovery.restrict_to_app_dir,
    };

    let mut loaders: Vec<Arc<dyn ServiceLoader>> = Vec::new();
    if discovery.section_static {
        loaders.push(Arc::new(SectionLoader::static_str(options)));
    }
    if discovery.section_cstr {
        loaders.push(Arc::new(SectionLoader::cstr(options)));
    }
    if !discovery.modules.is_empty() {
        loaders.push(Arc::new(ModuleLoader::new(discovery.modules.iter().cloned())));
    }
    if discovery.manifest && !config.services.is_empty() {
        loaders.push(Arc::new(ManifestLoader::new(config.services.clone())));
    }
    loaders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManifestEntry;

    fn names(loaders: &[Arc<dyn ServiceLoader>]) -> Vec<String> {
        loaders.iter().map(|l| l.name().to_string()).collect()
    }

    #[test]
    fn test_default_config_scans_both_sections() {
        let loaders = from_config(&OrchestratorConfig::default());
        assert_eq!(
            names(&loaders),
            ["section:linkme_ORCHESTRA_SVC", "section:linkme_ORCHESTRA_CSVC"]
        );
    }

    #[test]
    fn test_all_sources_in_order() {
        let mut config = OrchestratorConfig::default();
        config.discovery.section_cstr = false;
        config.discovery.modules = vec!["app.Core".into()];
        config.services = vec![ManifestEntry {
            class: "app.Push".into(),
            ..Default::default()
        }];
        assert_eq!(
            names(&from_config(&config)),
            ["section:linkme_ORCHESTRA_SVC", "modules", "manifest"]
        );

        config.discovery.manifest = false;
        assert_eq!(names(&from_config(&config)).len(), 2);
    }
}
