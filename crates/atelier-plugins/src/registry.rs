//! Plugin and middleware registry.
//!
//! The [`Registry`] is the single source of truth for which plugins and
//! middleware exist and which of them apply to a route. It is constructed by
//! application startup code and shared as `Arc<Registry>`.
//!
//! Both collections sit behind read-write locks. Locks are never held across
//! an `.await`: lookups return snapshots, and lifecycle hooks run with no lock
//! held.

use crate::config::{MiddlewareConfig, PluginConfig, PluginOptions};
use crate::matcher::{PatternError, RouteFilter};
use crate::middleware::Middleware;
use crate::plugin::Plugin;
use atelier_core::RegistryError;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A plugin together with its registration settings.
#[derive(Clone)]
pub struct RegisteredPlugin {
    plugin: Arc<dyn Plugin>,
    config: PluginConfig,
    filter: RouteFilter,
    options: Option<Arc<PluginOptions>>,
}

impl RegisteredPlugin {
    fn new(plugin: Arc<dyn Plugin>, config: PluginConfig) -> Result<Self, PatternError> {
        let filter = config.route_filter()?;
        let options = config.options.clone().map(Arc::new);
        Ok(Self {
            plugin,
            config,
            filter,
            options,
        })
    }

    /// Returns the plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    /// Returns the plugin.
    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    /// Returns the effective configuration, defaults filled in.
    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Returns the options bag injected into the request context.
    #[must_use]
    pub fn options(&self) -> Option<&Arc<PluginOptions>> {
        self.options.as_ref()
    }

    fn applies_to(&self, path: &str) -> bool {
        self.config.enabled && self.filter.applies_to(path)
    }
}

impl fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.name())
            .field("version", &self.plugin.version())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A middleware together with its registration settings.
#[derive(Clone)]
pub struct RegisteredMiddleware {
    middleware: Arc<dyn Middleware>,
    config: MiddlewareConfig,
    filter: RouteFilter,
}

impl RegisteredMiddleware {
    /// Returns the middleware name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.middleware.name()
    }

    /// Returns the middleware.
    #[must_use]
    pub fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }

    /// Returns the registration settings.
    #[must_use]
    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }
}

impl fmt::Debug for RegisteredMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMiddleware")
            .field("name", &self.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Registry of plugins and middleware.
///
/// # Example
///
/// ```
/// use atelier_plugins::config::PluginConfig;
/// use atelier_plugins::plugin::FnPlugin;
/// use atelier_plugins::registry::Registry;
///
/// # tokio_test::block_on(async {
/// let registry = Registry::new();
/// registry
///     .register_with(
///         FnPlugin::builder("seo").build(),
///         PluginConfig::new().with_priority(10).with_routes(["/api/*"]),
///     )
///     .await
///     .unwrap();
///
/// assert_eq!(registry.plugins_for_route("/api/pages").len(), 1);
/// assert!(registry.plugins_for_route("/admin").is_empty());
/// # });
/// ```
#[derive(Default)]
pub struct Registry {
    plugins: RwLock<IndexMap<String, RegisteredPlugin>>,
    middleware: RwLock<Vec<RegisteredMiddleware>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin with default settings.
    pub async fn register<P: Plugin>(&self, plugin: P) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(plugin), PluginConfig::default())
            .await
    }

    /// Registers a plugin with explicit settings.
    pub async fn register_with<P: Plugin>(
        &self,
        plugin: P,
        config: PluginConfig,
    ) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(plugin), config).await
    }

    /// Registers a shared plugin.
    ///
    /// The plugin's on-register hook runs before it is stored. If the hook
    /// fails nothing is stored.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicatePlugin`] if the name is taken
    /// - [`RegistryError::InvalidConfig`] if a route pattern is rejected
    /// - [`RegistryError::RegisterHookFailed`] if the on-register hook fails
    pub async fn register_arc(
        &self,
        plugin: Arc<dyn Plugin>,
        config: PluginConfig,
    ) -> Result<(), RegistryError> {
        let name = plugin.name().to_string();
        if self.has_plugin(&name) {
            return Err(RegistryError::DuplicatePlugin(name));
        }

        let entry = RegisteredPlugin::new(Arc::clone(&plugin), config).map_err(|source| {
            RegistryError::InvalidConfig {
                name: name.clone(),
                source: source.into(),
            }
        })?;

        if let Some(hook) = plugin.as_on_register() {
            hook.on_register()
                .await
                .map_err(|source| RegistryError::RegisterHookFailed {
                    name: name.clone(),
                    source,
                })?;
        }

        let mut plugins = self.plugins.write();
        // Another task may have claimed the name while the hook ran.
        if plugins.contains_key(&name) {
            return Err(RegistryError::DuplicatePlugin(name));
        }
        tracing::info!(
            plugin = %name,
            version = entry.plugin.version().unwrap_or("-"),
            priority = entry.config.priority,
            enabled = entry.config.enabled,
            "Plugin registered"
        );
        plugins.insert(name, entry);
        Ok(())
    }

    /// Unregisters a plugin.
    ///
    /// The plugin's on-unregister hook runs before removal. If the hook fails
    /// the plugin stays registered.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::PluginNotFound`] if no plugin has that name
    /// - [`RegistryError::UnregisterHookFailed`] if the on-unregister hook fails
    pub async fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let plugin = self
            .plugins
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.plugin))
            .ok_or_else(|| RegistryError::PluginNotFound(name.to_string()))?;

        if let Some(hook) = plugin.as_on_unregister() {
            hook.on_unregister()
                .await
                .map_err(|source| RegistryError::UnregisterHookFailed {
                    name: name.to_string(),
                    source,
                })?;
        }

        self.plugins
            .write()
            .shift_remove(name)
            .ok_or_else(|| RegistryError::PluginNotFound(name.to_string()))?;
        tracing::info!(plugin = %name, "Plugin unregistered");
        Ok(())
    }

    /// Registers a middleware.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateMiddleware`] if the name is taken.
    pub fn register_middleware<M: Middleware>(
        &self,
        middleware: M,
        config: MiddlewareConfig,
    ) -> Result<(), RegistryError> {
        self.register_middleware_arc(Arc::new(middleware), config)
    }

    /// Registers a shared middleware.
    ///
    /// The middleware list is re-sorted by ascending priority after insertion.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateMiddleware`] if the name is taken
    /// - [`RegistryError::InvalidConfig`] if a route pattern is rejected
    pub fn register_middleware_arc(
        &self,
        middleware: Arc<dyn Middleware>,
        config: MiddlewareConfig,
    ) -> Result<(), RegistryError> {
        let mut entries = self.middleware.write();
        if entries.iter().any(|m| m.name() == middleware.name()) {
            return Err(RegistryError::DuplicateMiddleware(
                middleware.name().to_string(),
            ));
        }

        let filter = config
            .route_filter()
            .map_err(|source| RegistryError::InvalidConfig {
                name: middleware.name().to_string(),
                source: source.into(),
            })?;
        tracing::info!(
            middleware = %middleware.name(),
            priority = config.priority,
            "Middleware registered"
        );
        entries.push(RegisteredMiddleware {
            middleware,
            config,
            filter,
        });
        entries.sort_by_key(|m| m.config.priority);
        Ok(())
    }

    /// Unregisters a middleware.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MiddlewareNotFound`] if no middleware has that name.
    pub fn unregister_middleware(&self, name: &str) -> Result<(), RegistryError> {
        let mut entries = self.middleware.write();
        let index = entries
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| RegistryError::MiddlewareNotFound(name.to_string()))?;
        entries.remove(index);
        tracing::info!(middleware = %name, "Middleware unregistered");
        Ok(())
    }

    /// Returns the enabled plugins applying to `path`, by ascending priority.
    #[must_use]
    pub fn plugins_for_route(&self, path: &str) -> Vec<RegisteredPlugin> {
        let mut matched: Vec<_> = self
            .plugins
            .read()
            .values()
            .filter(|entry| entry.applies_to(path))
            .cloned()
            .collect();
        matched.sort_by_key(|entry| entry.config.priority);
        matched
    }

    /// Returns the middleware applying to `path`, by ascending priority.
    #[must_use]
    pub fn middleware_for_route(&self, path: &str) -> Vec<RegisteredMiddleware> {
        self.middleware
            .read()
            .iter()
            .filter(|entry| entry.filter.applies_to(path))
            .cloned()
            .collect()
    }

    /// Returns `true` if a plugin with this name is registered.
    #[must_use]
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.read().contains_key(name)
    }

    /// Returns a registered plugin by name.
    #[must_use]
    pub fn get_plugin(&self, name: &str) -> Option<RegisteredPlugin> {
        self.plugins.read().get(name).cloned()
    }

    /// Returns every registered plugin, in registration order.
    #[must_use]
    pub fn plugins(&self) -> Vec<RegisteredPlugin> {
        self.plugins.read().values().cloned().collect()
    }

    /// Returns `true` if a middleware with this name is registered.
    #[must_use]
    pub fn has_middleware(&self, name: &str) -> bool {
        self.middleware.read().iter().any(|m| m.name() == name)
    }

    /// Returns every registered middleware, by ascending priority.
    #[must_use]
    pub fn middleware(&self) -> Vec<RegisteredMiddleware> {
        self.middleware.read().clone()
    }

    /// Removes every plugin and middleware.
    ///
    /// No on-unregister hooks run.
    pub fn clear(&self) {
        let plugins = {
            let mut plugins = self.plugins.write();
            let count = plugins.len();
            plugins.clear();
            count
        };
        let middleware = {
            let mut entries = self.middleware.write();
            let count = entries.len();
            entries.clear();
            count
        };
        tracing::info!(plugins, middleware, "Registry cleared");
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plugins: Vec<String> = self.plugins.read().keys().cloned().collect();
        let middleware: Vec<String> = self
            .middleware
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        f.debug_struct("Registry")
            .field("plugins", &plugins)
            .field("middleware", &middleware)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnMiddleware;
    use crate::plugin::{Flow, FnPlugin};
    use atelier_core::RegistryErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plugin(name: &str) -> FnPlugin {
        FnPlugin::builder(name).build()
    }

    fn middleware(name: &'static str) -> impl Middleware {
        FnMiddleware::new(name, |_ctx| Box::pin(async { Ok(Flow::Continue) }))
    }

    fn names(plugins: &[RegisteredPlugin]) -> Vec<&str> {
        plugins.iter().map(RegisteredPlugin::name).collect()
    }

    #[tokio::test]
    async fn test_register_applies_defaults() {
        let registry = Registry::new();
        registry.register(plugin("seo")).await.unwrap();

        let entry = registry.get_plugin("seo").unwrap();
        assert_eq!(entry.config(), &PluginConfig::default());
        assert!(entry.options().is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_keeps_first() {
        let registry = Registry::new();
        registry
            .register_with(plugin("seo"), PluginConfig::new().with_priority(5))
            .await
            .unwrap();

        let err = registry
            .register_with(plugin("seo"), PluginConfig::new().with_priority(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::Conflict);
        assert_eq!(registry.get_plugin("seo").unwrap().config().priority, 5);
    }

    #[tokio::test]
    async fn test_failed_on_register_stores_nothing() {
        let registry = Registry::new();
        let failing = FnPlugin::builder("broken")
            .on_register(|| async { Err(anyhow::anyhow!("no database")) })
            .build();

        let err = registry.register(failing).await.unwrap_err();
        assert!(matches!(err, RegistryError::RegisterHookFailed { ref name, .. } if name == "broken"));
        assert!(!registry.has_plugin("broken"));
    }

    #[tokio::test]
    async fn test_invalid_routes_rejected_before_on_register() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Registry::new();
        let pattern = "/a*".repeat(crate::matcher::MAX_PATTERN_LEN);
        let seo = FnPlugin::builder("seo")
            .on_register(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .build();

        let err = registry
            .register_with(seo, PluginConfig::new().with_routes([pattern.clone()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::InvalidConfig);
        assert!(matches!(err, RegistryError::InvalidConfig { ref name, .. } if name == "seo"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!registry.has_plugin("seo"));

        let err = registry
            .register_middleware(
                middleware("auth"),
                MiddlewareConfig::new().with_exclude_routes([pattern]),
            )
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::InvalidConfig);
        assert!(!registry.has_middleware("auth"));
    }

    #[tokio::test]
    async fn test_unregister_runs_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Registry::new();
        registry
            .register(
                FnPlugin::builder("seo")
                    .on_unregister(move || {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build(),
            )
            .await
            .unwrap();

        registry.unregister("seo").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.has_plugin("seo"));
    }

    #[tokio::test]
    async fn test_unregister_unknown() {
        let registry = Registry::new();
        let err = registry.unregister("ghost").await.unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::NotRegistered);
    }

    #[tokio::test]
    async fn test_failed_on_unregister_keeps_plugin() {
        let registry = Registry::new();
        registry
            .register(
                FnPlugin::builder("sticky")
                    .on_unregister(|| async { Err(anyhow::anyhow!("busy")) })
                    .build(),
            )
            .await
            .unwrap();

        let err = registry.unregister("sticky").await.unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::HookFailure);
        assert!(registry.has_plugin("sticky"));
    }

    #[tokio::test]
    async fn test_plugins_for_route_filters_and_sorts() {
        let registry = Registry::new();
        registry
            .register_with(plugin("late"), PluginConfig::new().with_priority(30))
            .await
            .unwrap();
        registry
            .register_with(
                plugin("api-only"),
                PluginConfig::new().with_priority(10).with_routes(["/api/*"]),
            )
            .await
            .unwrap();
        registry
            .register_with(plugin("disabled"), PluginConfig::new().with_enabled(false))
            .await
            .unwrap();
        registry
            .register_with(
                plugin("not-internal"),
                PluginConfig::new()
                    .with_priority(20)
                    .with_routes(["/api/*"])
                    .with_exclude_routes(["/api/internal/*"]),
            )
            .await
            .unwrap();

        assert_eq!(
            names(&registry.plugins_for_route("/api/users")),
            ["api-only", "not-internal", "late"]
        );
        assert_eq!(
            names(&registry.plugins_for_route("/api/internal/stats")),
            ["api-only", "late"]
        );
        assert_eq!(names(&registry.plugins_for_route("/admin")), ["late"]);
    }

    #[tokio::test]
    async fn test_options_are_shared() {
        let registry = Registry::new();
        registry
            .register_with(plugin("seo"), PluginConfig::new().with_option("max", 160))
            .await
            .unwrap();

        let entry = registry.get_plugin("seo").unwrap();
        assert_eq!(entry.options().unwrap()["max"], 160);
    }

    #[test]
    fn test_middleware_sorted_on_insert() {
        let registry = Registry::new();
        registry
            .register_middleware(middleware("c"), MiddlewareConfig::new().with_priority(30))
            .unwrap();
        registry
            .register_middleware(middleware("a"), MiddlewareConfig::new().with_priority(10))
            .unwrap();
        registry
            .register_middleware(middleware("b"), MiddlewareConfig::new().with_priority(20))
            .unwrap();

        let order: Vec<_> = registry
            .middleware()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn test_middleware_duplicate_and_missing() {
        let registry = Registry::new();
        registry
            .register_middleware(middleware("cors"), MiddlewareConfig::new())
            .unwrap();

        let err = registry
            .register_middleware(middleware("cors"), MiddlewareConfig::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateMiddleware(_)));

        registry.unregister_middleware("cors").unwrap();
        assert!(!registry.has_middleware("cors"));

        let err = registry.unregister_middleware("cors").unwrap_err();
        assert!(matches!(err, RegistryError::MiddlewareNotFound(_)));
    }

    #[test]
    fn test_middleware_for_route() {
        let registry = Registry::new();
        registry
            .register_middleware(
                middleware("api"),
                MiddlewareConfig::new().with_routes(["/api/"]),
            )
            .unwrap();
        registry
            .register_middleware(
                middleware("public"),
                MiddlewareConfig::new().with_exclude_routes(["/admin/*"]),
            )
            .unwrap();

        let for_api: Vec<_> = registry
            .middleware_for_route("/api/pages")
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(for_api, ["api", "public"]);

        let for_admin = registry.middleware_for_route("/admin/users");
        assert!(for_admin.is_empty());
    }

    #[tokio::test]
    async fn test_clear_skips_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Registry::new();
        registry
            .register(
                FnPlugin::builder("seo")
                    .on_unregister(move || {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build(),
            )
            .await
            .unwrap();
        registry
            .register_middleware(middleware("cors"), MiddlewareConfig::new())
            .unwrap();

        registry.clear();

        assert!(registry.plugins().is_empty());
        assert!(registry.middleware().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_debug_lists_names() {
        let registry = Registry::new();
        registry.register(plugin("seo")).await.unwrap();
        assert!(format!("{registry:?}").contains("seo"));
    }
}
