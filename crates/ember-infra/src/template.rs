//! HCL plan rendering.
//!
//! Attribute lines are emitted only for configured values; the provider
//! fills its own defaults for the rest.

use ember_core::infra::TemplateParams;

/// Pinned provider release known to support the runner resource.
const PROVIDER_VERSION: &str = "0.11.20";

pub(crate) fn provider() -> String {
    format!(
        r#"terraform {{
  required_providers {{
    iterative = {{
      source = "iterative/iterative"
      version = "{PROVIDER_VERSION}"
    }}
  }}
}}

provider "iterative" {{}}
"#
    )
}

pub(crate) fn runner(params: &TemplateParams) -> String {
    let mut attrs = Vec::new();
    push_str(&mut attrs, "driver", params.driver.as_str());
    push_str(&mut attrs, "repo", &params.repo);
    push_str(&mut attrs, "token", &params.token);
    push_str(&mut attrs, "labels", &params.labels.to_string());
    attrs.push(format!("  idle_timeout = {}", params.idle_timeout));
    push_str(&mut attrs, "name", &params.name);
    if params.single {
        attrs.push("  single = true".to_owned());
    }

    let cloud = &params.cloud;
    push_str(&mut attrs, "cloud", cloud.kind.as_str());
    push_str(&mut attrs, "region", &cloud.region);
    if let Some(instance_type) = &cloud.instance_type {
        push_str(&mut attrs, "instance_type", instance_type);
    }
    if let Some(gpu) = cloud.gpu {
        push_str(&mut attrs, "instance_gpu", gpu.as_str());
    }
    if let Some(hdd_size) = cloud.hdd_size {
        attrs.push(format!("  instance_hdd_size = {hdd_size}"));
    }
    if let Some(ssh_private) = &cloud.ssh_private {
        push_str(&mut attrs, "ssh_private", ssh_private);
    }
    if cloud.spot {
        attrs.push("  spot = true".to_owned());
        attrs.push(format!("  spot_price = {}", cloud.spot_price));
    }
    if let Some(startup_script) = &cloud.startup_script {
        push_str(&mut attrs, "startup_script", startup_script);
    }
    if let Some(group) = &cloud.aws_security_group {
        push_str(&mut attrs, "aws_security_group", group);
    }

    format!(
        "{}\nresource \"iterative_runner\" \"runner\" {{\n{}\n}}\n",
        provider(),
        attrs.join("\n")
    )
}

fn push_str(attrs: &mut Vec<String>, key: &str, value: &str) {
    attrs.push(format!("  {key} = \"{}\"", hcl_escape(value)));
}

fn hcl_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
