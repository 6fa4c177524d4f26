//! Cluster context resolution
//!
//! Turns a context name from a request into a [`ClusterContext`]. Resolvers
//! are read per request and never cache a resolved context.

use crate::error::{GatewayError, Result};
use crate::models::ClusterContext;
use kube::config::Kubeconfig;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Marker line where the embedded kubeconfig starts inside a secrets INI file
const KUBECONFIG_MARKER: &str = "apiVersion: v1";

/// Resolves a context name to a cluster context
pub trait ContextResolver: Send + Sync {
    /// Resolve `name`, or the default context when `None`
    fn resolve(&self, name: Option<&str>) -> Result<ClusterContext>;

    /// Names of every resolvable context
    fn contexts(&self) -> Vec<String>;
}

/// Fixed set of contexts
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    contexts: BTreeMap<String, ClusterContext>,
    default: Option<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context; the first one registered is the default
    pub fn with_context(mut self, context: ClusterContext) -> Self {
        if self.default.is_none() {
            self.default = Some(context.name.clone());
        }
        self.contexts.insert(context.name.clone(), context);
        self
    }
}

impl ContextResolver for StaticResolver {
    fn resolve(&self, name: Option<&str>) -> Result<ClusterContext> {
        let name = name
            .or(self.default.as_deref())
            .ok_or_else(|| GatewayError::NotFound("no default context configured".to_string()))?;
        self.contexts
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("context '{}'", name)))
    }

    fn contexts(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum KubeconfigSource {
    /// One explicit file, handed to kubectl as its `KUBECONFIG`
    File(PathBuf),
    /// Every file listed in `KUBECONFIG` merged, else `~/.kube/config`;
    /// kubectl keeps the environment it inherits
    Environment,
}

/// Resolves contexts from kubeconfig, re-read on every call
#[derive(Debug, Clone)]
pub struct KubeconfigResolver {
    source: KubeconfigSource,
}

impl KubeconfigResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            source: KubeconfigSource::File(path.into()),
        }
    }

    /// Resolve against the kubeconfig kubectl itself would load
    pub fn from_env() -> Self {
        Self {
            source: KubeconfigSource::Environment,
        }
    }

    /// Explicit kubeconfig file, `None` when resolving from the environment
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            KubeconfigSource::File(path) => Some(path),
            KubeconfigSource::Environment => None,
        }
    }

    fn load(&self) -> Result<Kubeconfig> {
        match &self.source {
            KubeconfigSource::File(path) => Ok(Kubeconfig::read_from(path)?),
            KubeconfigSource::Environment => Ok(Kubeconfig::read()?),
        }
    }
}

impl ContextResolver for KubeconfigResolver {
    fn resolve(&self, name: Option<&str>) -> Result<ClusterContext> {
        let kubeconfig = self.load()?;

        let name = match name {
            Some(name) => name.to_string(),
            None => kubeconfig.current_context.clone().ok_or_else(|| {
                GatewayError::NotFound("kubeconfig has no current-context".to_string())
            })?,
        };

        let named = kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| GatewayError::NotFound(format!("context '{}'", name)))?;

        let endpoint = named.context.as_ref().and_then(|ctx| {
            kubeconfig
                .clusters
                .iter()
                .find(|c| c.name == ctx.cluster)
                .and_then(|c| c.cluster.as_ref())
                .and_then(|c| c.server.clone())
        });

        debug!(context = %name, endpoint = ?endpoint, "Resolved context");

        let mut context = ClusterContext::new(name);
        if let Some(path) = self.path() {
            context = context.with_credentials(path);
        }
        if let Some(endpoint) = endpoint {
            context = context.with_endpoint(endpoint);
        }
        Ok(context)
    }

    fn contexts(&self) -> Vec<String> {
        self.load()
            .map(|k| k.contexts.into_iter().map(|c| c.name).collect())
            .unwrap_or_default()
    }
}

/// Extract the kubeconfig embedded in a secrets INI file into a temp file.
///
/// Returns `Ok(None)` when `ini_path` does not exist or holds no
/// `apiVersion: v1` marker. The file is created in `temp_dir` (the system
/// temp dir when `None`) and removed when the returned handle is dropped.
pub fn materialize_ini_kubeconfig(
    ini_path: &Path,
    temp_dir: Option<&Path>,
) -> Result<Option<NamedTempFile>> {
    if !ini_path.exists() {
        debug!(path = %ini_path.display(), "No secrets file, skipping kubeconfig extraction");
        return Ok(None);
    }

    let content = std::fs::read_to_string(ini_path)?;
    let Some(kubeconfig) = extract_kubeconfig(&content) else {
        warn!(
            path = %ini_path.display(),
            marker = KUBECONFIG_MARKER,
            "Secrets file holds no embedded kubeconfig, ignoring it"
        );
        return Ok(None);
    };

    let mut file = match temp_dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new()?,
    };
    file.write_all(kubeconfig.as_bytes())?;
    file.flush()?;

    info!(
        source = %ini_path.display(),
        kubeconfig = %file.path().display(),
        "Extracted kubeconfig from secrets file"
    );
    Ok(Some(file))
}

/// Everything from the first marker line onward
fn extract_kubeconfig(content: &str) -> Option<&str> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with(KUBECONFIG_MARKER) {
            return Some(&content[offset..]);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
current-context: staging
clusters:
- name: prod-cluster
  cluster:
    server: https://prod.example.com:6443
- name: staging-cluster
  cluster:
    server: https://staging.example.com:6443
contexts:
- name: prod
  context:
    cluster: prod-cluster
    user: admin
- name: staging
  context:
    cluster: staging-cluster
    user: admin
users:
- name: admin
  user:
    token: abc
"#;

    fn write_kubeconfig(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("config");
        fs::write(&path, KUBECONFIG).unwrap();
        path
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new()
            .with_context(ClusterContext::new("prod"))
            .with_context(ClusterContext::new("dev"));

        assert_eq!(resolver.resolve(None).unwrap().name, "prod");
        assert_eq!(resolver.resolve(Some("dev")).unwrap().name, "dev");
        assert!(matches!(
            resolver.resolve(Some("missing")),
            Err(GatewayError::NotFound(_))
        ));
        assert_eq!(resolver.contexts(), vec!["dev", "prod"]);
    }

    #[test]
    fn test_kubeconfig_resolver_named_context() {
        let dir = TempDir::new().unwrap();
        let path = write_kubeconfig(&dir);
        let resolver = KubeconfigResolver::new(&path);

        let ctx = resolver.resolve(Some("prod")).unwrap();
        assert_eq!(ctx.name, "prod");
        assert_eq!(ctx.api_endpoint.as_deref(), Some("https://prod.example.com:6443"));
        assert_eq!(ctx.credential_ref.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_kubeconfig_resolver_current_context() {
        let dir = TempDir::new().unwrap();
        let resolver = KubeconfigResolver::new(write_kubeconfig(&dir));

        let ctx = resolver.resolve(None).unwrap();
        assert_eq!(ctx.name, "staging");
        assert_eq!(resolver.contexts(), vec!["prod", "staging"]);
    }

    #[test]
    fn test_kubeconfig_resolver_unknown_context() {
        let dir = TempDir::new().unwrap();
        let resolver = KubeconfigResolver::new(write_kubeconfig(&dir));
        assert!(matches!(
            resolver.resolve(Some("qa")),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn test_materialize_ini_kubeconfig() {
        let dir = TempDir::new().unwrap();
        let ini = dir.path().join("kubectl.ini");
        fs::write(&ini, format!("[kubectl]\nconfig = |\n{}", KUBECONFIG)).unwrap();

        let file = materialize_ini_kubeconfig(&ini, Some(dir.path()))
            .unwrap()
            .expect("kubeconfig extracted");
        let written = fs::read_to_string(file.path()).unwrap();
        assert!(written.starts_with("apiVersion: v1"));

        let resolver = KubeconfigResolver::new(file.path());
        assert_eq!(resolver.resolve(Some("prod")).unwrap().name, "prod");

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_materialize_missing_ini_is_none() {
        let dir = TempDir::new().unwrap();
        let result = materialize_ini_kubeconfig(&dir.path().join("absent.ini"), None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_materialize_without_marker_is_none() {
        let dir = TempDir::new().unwrap();
        let ini = dir.path().join("kubectl.ini");
        fs::write(&ini, "[kubectl]\ntoken = abc\n").unwrap();

        let result = materialize_ini_kubeconfig(&ini, Some(dir.path())).unwrap();
        assert!(result.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_env_resolver_merges_every_kubeconfig_file() {
        const SECOND: &str = r#"apiVersion: v1
kind: Config
clusters:
- name: qa-cluster
  cluster:
    server: https://qa.example.com:6443
contexts:
- name: qa
  context:
    cluster: qa-cluster
    user: qa-admin
users:
- name: qa-admin
  user:
    token: def
"#;
        let dir = TempDir::new().unwrap();
        let first = write_kubeconfig(&dir);
        let second = dir.path().join("qa");
        fs::write(&second, SECOND).unwrap();

        let joined = std::env::join_paths([&first, &second]).unwrap();
        std::env::set_var("KUBECONFIG", &joined);
        let resolver = KubeconfigResolver::from_env();
        let qa = resolver.resolve(Some("qa"));
        let prod = resolver.resolve(Some("prod"));
        std::env::remove_var("KUBECONFIG");

        let qa = qa.unwrap();
        assert_eq!(qa.api_endpoint.as_deref(), Some("https://qa.example.com:6443"));
        assert!(qa.credential_ref.is_none());
        assert!(resolver.path().is_none());
        assert_eq!(prod.unwrap().name, "prod");
    }
}
