//! Capability extraction
//!
//! Summarizes what a managed resource can do from its recorded properties,
//! e.g. which ports a security group opens.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Well-known services reported as `allows_<service>` flags.
pub const COMMON_PORTS: &[(&str, u16)] = &[
    ("http", 80),
    ("https", 443),
    ("ssh", 22),
    ("ftp", 21),
    ("smtp", 25),
    ("dns", 53),
    ("mysql", 3306),
    ("postgresql", 5432),
    ("redis", 6379),
];

const VPC_PROPERTIES: &[&str] = &["cidrBlock", "state", "isDefault", "dhcpOptionsId"];
const SUBNET_PROPERTIES: &[&str] = &[
    "vpcId",
    "cidrBlock",
    "availabilityZone",
    "state",
    "mapPublicIpOnLaunch",
    "assignIpv6AddressOnCreation",
];
const INSTANCE_PROPERTIES: &[&str] = &[
    "instanceType",
    "state",
    "vpcId",
    "subnetId",
    "availabilityZone",
    "privateIpAddress",
    "publicIpAddress",
    "keyName",
    "platform",
    "architecture",
    "securityGroups",
];
const LOAD_BALANCER_PROPERTIES: &[&str] = &[
    "type",
    "scheme",
    "state",
    "vpcId",
    "ipAddressType",
    "dnsName",
    "securityGroups",
    "subnets",
];
const TARGET_GROUP_PROPERTIES: &[&str] =
    &["port", "protocol", "vpcId", "healthCheckPath", "targetType"];
const DB_INSTANCE_PROPERTIES: &[&str] = &[
    "engine",
    "engineVersion",
    "dbInstanceClass",
    "dbInstanceStatus",
    "allocatedStorage",
    "multiAZ",
    "endpoint",
];

/// Derive the capability map for a resource of `resource_type`.
///
/// Every result carries `resource_type`. Unknown types get nothing else.
pub fn extract_capabilities(resource_type: &str, properties: &Map<String, Value>) -> Map<String, Value> {
    let mut capabilities = Map::new();
    capabilities.insert("resource_type".to_string(), Value::from(resource_type));

    match resource_type {
        "security_group" => security_group(properties, &mut capabilities),
        "vpc" => copy_snake_case(properties, VPC_PROPERTIES, &mut capabilities),
        "subnet" => copy_snake_case(properties, SUBNET_PROPERTIES, &mut capabilities),
        "ec2_instance" | "instance" => {
            copy_snake_case(properties, INSTANCE_PROPERTIES, &mut capabilities)
        }
        "load_balancer" => copy_snake_case(properties, LOAD_BALANCER_PROPERTIES, &mut capabilities),
        "target_group" => copy_snake_case(properties, TARGET_GROUP_PROPERTIES, &mut capabilities),
        "db_instance" | "rds_db_instance" | "database" => {
            copy_snake_case(properties, DB_INSTANCE_PROPERTIES, &mut capabilities)
        }
        _ => {}
    }
    capabilities
}

fn security_group(properties: &Map<String, Value>, capabilities: &mut Map<String, Value>) {
    for (from, to) in [("vpcId", "vpc_id"), ("groupName", "group_name")] {
        if let Some(value) = properties.get(from) {
            capabilities.insert(to.to_string(), value.clone());
        }
    }

    if let Some(rules) = properties.get("ingress_rules") {
        let ports = open_ports(rules);
        capabilities.insert("ingress_rule_count".to_string(), Value::from(rule_count(rules)));
        capabilities.insert("port_count".to_string(), Value::from(ports.len()));
        for (service, port) in COMMON_PORTS {
            capabilities.insert(format!("allows_{}", service), Value::from(ports.contains(port)));
        }
        capabilities.insert(
            "open_ports".to_string(),
            Value::from(ports.into_iter().collect::<Vec<_>>()),
        );
    }

    if let Some(rules) = properties.get("egress_rules") {
        capabilities.insert("egress_rule_count".to_string(), Value::from(rule_count(rules)));
    }
}

fn rule_count(rules: &Value) -> usize {
    match rules {
        Value::Array(items) => items.len(),
        Value::Object(_) => 1,
        _ => 0,
    }
}

/// Sorted set of ports covered by `from_port..=to_port` across all rules.
pub fn open_ports(rules: &Value) -> BTreeSet<u16> {
    let rules: Vec<&Value> = match rules {
        Value::Array(items) => items.iter().collect(),
        single @ Value::Object(_) => vec![single],
        _ => Vec::new(),
    };

    let mut ports = BTreeSet::new();
    for rule in rules {
        let Some(from) = rule.get("from_port").and_then(port_number) else {
            continue;
        };
        let to = rule.get("to_port").and_then(port_number).unwrap_or(from);
        if from <= to {
            ports.extend(from..=to);
        }
    }
    ports
}

fn port_number(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn copy_snake_case(properties: &Map<String, Value>, names: &[&str], capabilities: &mut Map<String, Value>) {
    for name in names {
        if let Some(value) = properties.get(*name) {
            capabilities.insert(snake_case(name), value.clone());
        }
    }
}

/// `availabilityZone` → `availability_zone`
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_upper = false;
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !previous_upper {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            previous_upper = true;
        } else {
            out.push(c);
            previous_upper = false;
        }
    }
    out
}
