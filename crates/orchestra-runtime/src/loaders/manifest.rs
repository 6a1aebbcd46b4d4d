use orchestra_core::{Args, Priority, RetentionPolicy, ServiceDefinition, ServiceLoader};
use tracing::warn;

use crate::config::ManifestEntry;

/// Turns `[[services]]` configuration entries into named definitions.
///
/// Names are resolved against the catalog when the definitions are merged.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    entries: Vec<ManifestEntry>,
}

impl ManifestLoader {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }
}

fn definition(entry: &ManifestEntry) -> ServiceDefinition {
    let mut def = ServiceDefinition::named(entry.class.clone())
        .args(Args::from(entry.args.clone()));

    if let Some(priority) = entry.priority {
        def = def.priority(Priority::new(priority));
    }
    if let Some(raw) = &entry.retention {
        match raw.parse::<RetentionPolicy>() {
            Ok(retention) => def = def.retention(retention),
            Err(e) => warn!(
                class = %entry.class,
                retention = %raw,
                error = %e,
                "Malformed retention in manifest, using the type default"
            ),
        }
    }
    if let Some(factory) = &entry.factory {
        def = def.factory_named(factory.clone());
    }
    def
}

impl ServiceLoader for ManifestLoader {
    fn name(&self) -> &str {
        "manifest"
    }

    fn load(&self) -> Vec<ServiceDefinition> {
        self.entries.iter().map(definition).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{FactoryRef, ServiceRef};
    use serde_json::json;

    fn entry(value: serde_json::Value) -> ManifestEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_entry_overrides() {
        let loader = ManifestLoader::new(vec![entry(json!({
            "class": "app.Push",
            "priority": 900,
            "retention": "Hold",
            "factory": "app.PushFactory",
            "args": { "endpoint": "https://push.example" }
        }))]);

        let defs = loader.load();
        assert_eq!(defs.len(), 1);
        let def = &defs[0];
        assert!(matches!(&def.service, ServiceRef::Named(n) if n == "app.Push"));
        assert!(matches!(&def.factory, Some(FactoryRef::Named(n)) if n == "app.PushFactory"));
        assert_eq!(def.priority, Some(Priority::new(900)));
        assert_eq!(def.retention, Some(RetentionPolicy::Hold));
        assert_eq!(
            def.args.get_as::<String>("endpoint").as_deref(),
            Some("https://push.example")
        );
    }

    #[test]
    fn test_malformed_retention_falls_back() {
        let loader = ManifestLoader::new(vec![
            entry(json!({ "class": "app.A", "retention": "forever", "priority": 10 })),
            entry(json!({ "class": "app.B" })),
        ]);
        let defs = loader.load();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].retention, None);
        assert_eq!(defs[0].priority, Some(Priority::new(10)));
        assert!(defs[1].factory.is_none() && defs[1].args.is_empty());
    }
}
