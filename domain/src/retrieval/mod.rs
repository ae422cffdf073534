//! Value retrieval registry
//!
//! `retrieve` steps do not call a plan-named tool. They name a *value type*
//! (`latest_ami`, `default_vpc`, `load_balancer_arn`, ...) which the
//! registry maps to a built-in [`RetrievalKind`]. Exact names are matched
//! first, then the `_id` / `_name` suffix patterns.

use std::collections::HashMap;

/// Retrievals that re-expose a value produced by an earlier step
/// (named by the step's `step_ref` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepRefKind {
    LoadBalancerArn,
    TargetGroupArn,
    LaunchTemplateId,
    SecurityGroupId,
    DbSubnetGroupName,
    AutoScalingGroupArn,
    AutoScalingGroupName,
    /// Resolves the instance id, then looks up its endpoint
    RdsEndpoint,
}

impl StepRefKind {
    pub fn value_type(&self) -> &'static str {
        match self {
            StepRefKind::LoadBalancerArn => "load_balancer_arn",
            StepRefKind::TargetGroupArn => "target_group_arn",
            StepRefKind::LaunchTemplateId => "launch_template_id",
            StepRefKind::SecurityGroupId => "security_group_id",
            StepRefKind::DbSubnetGroupName => "db_subnet_group_name",
            StepRefKind::AutoScalingGroupArn => "auto_scaling_group_arn",
            StepRefKind::AutoScalingGroupName => "auto_scaling_group_name",
            StepRefKind::RdsEndpoint => "rds_endpoint",
        }
    }

    /// Extra result keys carrying the same value.
    pub fn alias_fields(&self) -> &'static [&'static str] {
        match self {
            StepRefKind::LoadBalancerArn => &["loadBalancerArn", "arn"],
            StepRefKind::TargetGroupArn => &["targetGroupArn", "arn"],
            StepRefKind::LaunchTemplateId => &["launchTemplateId"],
            StepRefKind::SecurityGroupId => &["securityGroupId", "groupId"],
            StepRefKind::DbSubnetGroupName => &["dbSubnetGroupName", "subnetGroupName"],
            StepRefKind::AutoScalingGroupArn => &["autoScalingGroupArn", "asgArn", "arn"],
            StepRefKind::AutoScalingGroupName => &["autoScalingGroupName", "asgName", "name"],
            StepRefKind::RdsEndpoint => &["endpoint", "rdsEndpoint", "address"],
        }
    }

    /// Human label used in result descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            StepRefKind::LoadBalancerArn => "Load balancer ARN",
            StepRefKind::TargetGroupArn => "Target group ARN",
            StepRefKind::LaunchTemplateId => "Launch template ID",
            StepRefKind::SecurityGroupId => "Security group ID",
            StepRefKind::DbSubnetGroupName => "DB subnet group name",
            StepRefKind::AutoScalingGroupArn => "Auto Scaling Group ARN",
            StepRefKind::AutoScalingGroupName => "Auto Scaling Group name",
            StepRefKind::RdsEndpoint => "RDS endpoint",
        }
    }
}

/// A built-in lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RetrievalKind {
    LatestImage,
    DefaultVpc,
    ExistingVpc,
    DefaultSubnet,
    SubnetsInVpc,
    AvailabilityZones,
    SubnetsForLoadBalancer,
    StepReference(StepRefKind),
    /// Find a resource in the managed state. An empty type matches any.
    ManagedState { resource_type: String },
}

/// Value type → retrieval kind table, built once at startup.
#[derive(Debug, Clone)]
pub struct RetrievalRegistry {
    exact: HashMap<String, RetrievalKind>,
    /// Suffixes mapping `<type><suffix>` to a managed-state lookup of `<type>`
    suffixes: Vec<&'static str>,
}

fn managed(resource_type: &str) -> RetrievalKind {
    RetrievalKind::ManagedState {
        resource_type: resource_type.to_string(),
    }
}

impl Default for RetrievalRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RetrievalRegistry {
    pub fn empty() -> Self {
        Self {
            exact: HashMap::new(),
            suffixes: Vec::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("latest_ami", RetrievalKind::LatestImage);
        registry.register("default_vpc", RetrievalKind::DefaultVpc);
        registry.register("existing_vpc", RetrievalKind::ExistingVpc);
        registry.register("default_subnet", RetrievalKind::DefaultSubnet);
        registry.register("subnets_in_vpc", RetrievalKind::SubnetsInVpc);
        registry.register("available_azs", RetrievalKind::AvailabilityZones);
        registry.register("select_subnets_for_alb", RetrievalKind::SubnetsForLoadBalancer);

        for kind in [
            StepRefKind::LoadBalancerArn,
            StepRefKind::TargetGroupArn,
            StepRefKind::LaunchTemplateId,
            StepRefKind::DbSubnetGroupName,
            StepRefKind::AutoScalingGroupArn,
            StepRefKind::AutoScalingGroupName,
            StepRefKind::RdsEndpoint,
        ] {
            registry.register(kind.value_type(), RetrievalKind::StepReference(kind));
        }
        // `security_group_id` itself is a managed-state lookup
        registry.register(
            "security_group_id_ref",
            RetrievalKind::StepReference(StepRefKind::SecurityGroupId),
        );

        registry.register("vpc_id", managed("vpc"));
        registry.register("subnet_id", managed("subnet"));
        registry.register("security_group_id", managed("security_group"));
        registry.register("instance_id", managed("ec2_instance"));
        registry.register("existing_resource", managed(""));

        registry.suffixes = vec!["_id", "_name"];
        registry
    }

    pub fn register(&mut self, value_type: impl Into<String>, kind: RetrievalKind) {
        self.exact.insert(value_type.into(), kind);
    }

    /// Exact match first, then suffix patterns.
    pub fn lookup(&self, value_type: &str) -> Option<RetrievalKind> {
        if let Some(kind) = self.exact.get(value_type) {
            return Some(kind.clone());
        }
        self.suffixes.iter().find_map(|suffix| {
            value_type
                .strip_suffix(suffix)
                .filter(|prefix| !prefix.is_empty())
                .map(managed)
        })
    }

    /// Registered exact value types, sorted.
    pub fn value_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.exact.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Keyword table for inferring a value type; first match wins.
const INFERENCE_KEYWORDS: &[(&[&str], &str)] = &[
    (&["availability zone"], "available_azs"),
    (&["ami", "image"], "latest_ami"),
    (&["default subnet"], "default_subnet"),
    (&["subnets"], "subnets_in_vpc"),
    (&["default vpc"], "default_vpc"),
    (&["vpc"], "existing_vpc"),
];

/// Guess a value type from a step's name and description.
pub fn infer_value_type(name: &str, description: &str) -> Option<&'static str> {
    let text = format!("{} {}", name, description).to_lowercase();
    INFERENCE_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, value_type)| *value_type)
}
