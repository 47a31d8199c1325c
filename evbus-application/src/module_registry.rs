use crate::config::ModuleName;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use dashmap::DashMap;
use evbus_domain::eventing::EventBus;
use std::sync::Arc;
use tracing::warn;

/// 功能模块：启动时向总线注册自己的事件处理器
#[async_trait]
pub trait FeatureModule: Send + Sync {
    fn name(&self) -> ModuleName;

    async fn register_handlers(&self, bus: &Arc<EventBus>) -> anyhow::Result<()>;
}

/// 模块注册表
/// - 以模块名为键，由组合根在启动前登记已迁移的模块
/// - 未登记的模块在启动时视为“尚未迁移”
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<ModuleName, Arc<dyn FeatureModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记模块；同名模块会被替换
    pub fn register(&self, module: Arc<dyn FeatureModule>) {
        let name = module.name();
        if self.modules.insert(name, module).is_some() {
            warn!(module = %name, "module registered twice, keeping the latest");
        }
    }

    pub fn with(self, module: Arc<dyn FeatureModule>) -> Self {
        self.register(module);
        self
    }

    pub fn contains(&self, name: ModuleName) -> bool {
        self.modules.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// 加载一个模块：未登记返回 `Ok(false)`，注册处理器失败返回 `AppError::Module`
    pub async fn load(&self, name: ModuleName, bus: &Arc<EventBus>) -> AppResult<bool> {
        let Some(module) = self.modules.get(&name).map(|m| m.value().clone()) else {
            return Ok(false);
        };

        module
            .register_handlers(bus)
            .await
            .map_err(|err| AppError::Module {
                module: name.to_string(),
                reason: format!("{err:#}"),
            })?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evbus_domain::eventing::handler_fn;

    struct Gamification;

    #[async_trait]
    impl FeatureModule for Gamification {
        fn name(&self) -> ModuleName {
            ModuleName::Gamification
        }

        async fn register_handlers(&self, bus: &Arc<EventBus>) -> anyhow::Result<()> {
            bus.subscribe("ATTEMPT_GRADED", handler_fn("award-xp", |_| async { Ok(()) }));
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl FeatureModule for Broken {
        fn name(&self) -> ModuleName {
            ModuleName::Analytics
        }

        async fn register_handlers(&self, _bus: &Arc<EventBus>) -> anyhow::Result<()> {
            anyhow::bail!("analytics store offline")
        }
    }

    #[tokio::test]
    async fn load_distinguishes_missing_loaded_and_failing() {
        let registry = ModuleRegistry::new()
            .with(Arc::new(Gamification))
            .with(Arc::new(Broken));
        let bus = Arc::new(EventBus::in_memory());

        assert!(registry.load(ModuleName::Gamification, &bus).await.unwrap());
        assert_eq!(bus.handler_count("ATTEMPT_GRADED"), 1);

        assert!(!registry.load(ModuleName::Messaging, &bus).await.unwrap());

        let err = registry.load(ModuleName::Analytics, &bus).await.unwrap_err();
        assert!(matches!(err, AppError::Module { .. }));
        assert!(err.to_string().contains("analytics store offline"));
    }
}
