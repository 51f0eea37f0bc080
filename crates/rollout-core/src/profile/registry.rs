//! Profile merging
//!
//! Override profiles are registered by name; default profiles only fill what an override
//! left unset. Defaults never introduce a profile that was not declared as an override.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    BuildBlock, ChartPushBlock, DeployBlock, LoginBlock, Profile, PushBlock, ScanBlock,
};
use crate::error::ConfigError;

/// Which missing blocks an override inherits wholesale from its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockInheritance {
    /// Only a missing `login` block is copied from the default; other blocks are
    /// filled field by field when the override declares them.
    #[default]
    LoginOnly,
    /// Every missing block is copied from the default.
    AllBlocks,
}

/// Registry of override profiles with default merging.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    inheritance: BlockInheritance,
    profiles: BTreeMap<String, Profile>,
}

impl ProfileRegistry {
    pub fn new(inheritance: BlockInheritance) -> Self {
        Self {
            inheritance,
            profiles: BTreeMap::new(),
        }
    }

    /// Merge `defaults` into `overrides` and return the resolved profiles by name.
    pub fn resolve(
        defaults: &[Profile],
        overrides: Vec<Profile>,
        inheritance: BlockInheritance,
    ) -> Result<BTreeMap<String, Profile>, ConfigError> {
        let mut registry = Self::new(inheritance);
        for profile in overrides {
            registry.register(profile)?;
        }
        for default in defaults {
            registry.apply_default(default);
        }
        Ok(registry.into_profiles())
    }

    /// Register an override profile. A second profile with the same name is rejected.
    pub fn register(&mut self, profile: Profile) -> Result<(), ConfigError> {
        if self.profiles.contains_key(&profile.name) {
            return Err(ConfigError::DuplicateProfile(profile.name));
        }
        debug!(profile = %profile.name, "registered profile");
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Fill the unset fields of the same-named override from `default`.
    ///
    /// Returns `false` when no override with that name exists; the default is dropped.
    pub fn apply_default(&mut self, default: &Profile) -> bool {
        let Some(target) = self.profiles.get_mut(&default.name) else {
            debug!(profile = %default.name, "default profile has no override, skipping");
            return false;
        };
        merge_profile(target, default, self.inheritance);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profiles(&self) -> &BTreeMap<String, Profile> {
        &self.profiles
    }

    pub fn into_profiles(self) -> BTreeMap<String, Profile> {
        self.profiles
    }
}

fn merge_profile(target: &mut Profile, default: &Profile, inheritance: BlockInheritance) {
    // login presence is always inherited
    merge_block(&mut target.login, &default.login, true, fill_login);

    let inherit_blocks = inheritance == BlockInheritance::AllBlocks;
    merge_block(&mut target.build, &default.build, inherit_blocks, fill_build);
    merge_block(&mut target.scan, &default.scan, inherit_blocks, fill_scan);
    merge_block(&mut target.push, &default.push, inherit_blocks, fill_push);
    merge_block(&mut target.deploy, &default.deploy, inherit_blocks, fill_deploy);
    merge_block(
        &mut target.chart_push,
        &default.chart_push,
        inherit_blocks,
        fill_chart_push,
    );
}

fn merge_block<B: Clone>(
    target: &mut Option<B>,
    default: &Option<B>,
    inherit_presence: bool,
    fill: fn(&mut B, &B),
) {
    if let Some(block) = target.as_mut() {
        if let Some(base) = default {
            fill(block, base);
        }
    } else if inherit_presence {
        *target = default.clone();
    }
}

fn fill_login(block: &mut LoginBlock, base: &LoginBlock) {
    block.registry_root.fill_from(&base.registry_root);
    block.login_method.fill_from(&base.login_method);
    block.username.fill_from(&base.username);
    block.password.fill_from(&base.password);
    block.aws_profile.fill_from(&base.aws_profile);
}

fn fill_build(block: &mut BuildBlock, base: &BuildBlock) {
    block.prepare_step.fill_from(&base.prepare_step);
    block.version.fill_from(&base.version);
    block.context_dir.fill_from(&base.context_dir);
    block.architecture.fill_from(&base.architecture);
}

fn fill_scan(block: &mut ScanBlock, base: &ScanBlock) {
    block.context_dir.fill_from(&base.context_dir);
    block.fail_on.fill_from(&base.fail_on);
    block.ignore_file.fill_from(&base.ignore_file);
}

fn fill_push(block: &mut PushBlock, base: &PushBlock) {
    block.registry_root.fill_from(&base.registry_root);
    block.login_method.fill_from(&base.login_method);
    block.username.fill_from(&base.username);
    block.password.fill_from(&base.password);
    block.aws_profile.fill_from(&base.aws_profile);
}

fn fill_deploy(block: &mut DeployBlock, base: &DeployBlock) {
    block.chart_dir.fill_from(&base.chart_dir);
    block.kube_context.fill_from(&base.kube_context);
    block.kube_config.fill_from(&base.kube_config);
    block.target_namespaces.fill_from(&base.target_namespaces);
    block.attributes.fill_from(&base.attributes);
    block.skip_layer_check.fill_from(&base.skip_layer_check);
}

fn fill_chart_push(block: &mut ChartPushBlock, base: &ChartPushBlock) {
    block.chart_dir.fill_from(&base.chart_dir);
    block.repository_url.fill_from(&base.repository_url);
    block.username.fill_from(&base.username);
    block.password.fill_from(&base.password);
    block.version.fill_from(&base.version);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{LoginMethod, Setting};

    fn push_block(root: &str) -> PushBlock {
        PushBlock {
            registry_root: root.to_string().into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_override_fields_take_precedence() {
        let default = Profile::new("default").with_push(PushBlock {
            registry_root: "base.example.com".to_string().into(),
            username: "base-user".to_string().into(),
            ..Default::default()
        });
        let profile = Profile::new("default").with_push(push_block("override.example.com"));

        let resolved =
            ProfileRegistry::resolve(&[default], vec![profile], BlockInheritance::LoginOnly)
                .unwrap();
        let push = resolved["default"].push.clone().unwrap();

        assert_eq!(push.registry_root.get().unwrap(), "override.example.com");
        assert_eq!(push.username.get().unwrap(), "base-user");
        assert!(push.password.is_unset());
    }

    #[test]
    fn test_explicit_empty_is_not_filled() {
        let default = Profile::new("staging").with_push(PushBlock {
            password: "secret".to_string().into(),
            ..push_block("r")
        });
        let profile = Profile::new("staging").with_push(PushBlock {
            password: String::new().into(),
            ..Default::default()
        });

        let resolved =
            ProfileRegistry::resolve(&[default], vec![profile], BlockInheritance::LoginOnly)
                .unwrap();
        let push = resolved["staging"].push.clone().unwrap();
        assert_eq!(push.password, Setting::Value(String::new()));
        assert_eq!(push.registry_root.get().unwrap(), "r");
    }

    #[test]
    fn test_default_without_override_is_dropped() {
        let default = Profile::new("default").with_push(push_block("r"));
        let resolved = ProfileRegistry::resolve(
            &[default],
            vec![Profile::new("prod")],
            BlockInheritance::LoginOnly,
        )
        .unwrap();

        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("prod"));
        assert!(resolved["prod"].push.is_none());
    }

    #[test]
    fn test_login_block_is_synthesized() {
        let login = LoginBlock {
            registry_root: "r.example.com".to_string().into(),
            login_method: LoginMethod::Aws.into(),
            aws_profile: "ops".to_string().into(),
            ..Default::default()
        };
        let default = Profile::new("prod").with_login(login.clone());

        let resolved = ProfileRegistry::resolve(
            &[default],
            vec![Profile::new("prod")],
            BlockInheritance::LoginOnly,
        )
        .unwrap();

        assert_eq!(resolved["prod"].login, Some(login));
    }

    #[test]
    fn test_login_only_does_not_inherit_other_blocks() {
        let default = Profile::new("prod")
            .with_build(BuildBlock::default())
            .with_push(push_block("r"));

        let resolved = ProfileRegistry::resolve(
            &[default],
            vec![Profile::new("prod")],
            BlockInheritance::LoginOnly,
        )
        .unwrap();

        assert!(resolved["prod"].build.is_none());
        assert!(resolved["prod"].push.is_none());
    }

    #[test]
    fn test_all_blocks_inherits_missing_blocks() {
        let default = Profile::new("prod")
            .with_build(BuildBlock::default())
            .with_push(push_block("r"));

        let resolved = ProfileRegistry::resolve(
            &[default],
            vec![Profile::new("prod")],
            BlockInheritance::AllBlocks,
        )
        .unwrap();

        assert_eq!(resolved["prod"].build, Some(BuildBlock::default()));
        assert_eq!(resolved["prod"].push, Some(push_block("r")));
    }

    #[test]
    fn test_duplicate_override_is_rejected() {
        let err = ProfileRegistry::resolve(
            &[],
            vec![Profile::new("prod"), Profile::new("prod").with_push(push_block("x"))],
            BlockInheritance::LoginOnly,
        )
        .unwrap_err();

        assert_eq!(err, ConfigError::DuplicateProfile("prod".to_string()));
    }

    #[test]
    fn test_register_rejects_eagerly() {
        let mut registry = ProfileRegistry::default();
        registry.register(Profile::new("a")).unwrap();
        assert!(registry.register(Profile::new("a")).is_err());
        assert_eq!(registry.profiles().len(), 1);
    }

    #[test]
    fn test_attributes_are_a_single_field() {
        let mut base_attrs = BTreeMap::new();
        base_attrs.insert("replicas".to_string(), "3".to_string());
        let mut own_attrs = BTreeMap::new();
        own_attrs.insert("debug".to_string(), "true".to_string());

        let default = Profile::new("dev").with_deploy(DeployBlock {
            attributes: base_attrs.into(),
            chart_dir: "charts/app".to_string().into(),
            ..Default::default()
        });
        let profile = Profile::new("dev").with_deploy(DeployBlock {
            attributes: own_attrs.clone().into(),
            ..Default::default()
        });

        let resolved =
            ProfileRegistry::resolve(&[default], vec![profile], BlockInheritance::LoginOnly)
                .unwrap();
        let deploy = resolved["dev"].deploy.clone().unwrap();
        assert_eq!(deploy.attributes, Setting::Value(own_attrs));
        assert_eq!(deploy.chart_dir.get().unwrap(), "charts/app");
    }

    #[test]
    fn test_later_defaults_fill_remaining_fields() {
        let first = Profile::new("dev").with_push(PushBlock {
            username: "first".to_string().into(),
            ..Default::default()
        });
        let second = Profile::new("dev").with_push(PushBlock {
            username: "second".to_string().into(),
            registry_root: "r".to_string().into(),
            ..Default::default()
        });
        let profile = Profile::new("dev").with_push(PushBlock::default());

        let resolved = ProfileRegistry::resolve(
            &[first, second],
            vec![profile],
            BlockInheritance::LoginOnly,
        )
        .unwrap();
        let push = resolved["dev"].push.clone().unwrap();
        assert_eq!(push.username.get().unwrap(), "first");
        assert_eq!(push.registry_root.get().unwrap(), "r");
    }
}
