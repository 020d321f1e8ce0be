//! Build job definition

use berth_core::{naming, Instance};
use std::path::PathBuf;

/// Values substituted into the job configuration
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub label: String,
    pub instance_path: PathBuf,
    pub addons_path: PathBuf,
    pub git_user: String,
    pub git_token: String,
    pub repo_name: String,
}

impl JobSpec {
    pub fn for_instance(instance: &Instance, git_user: &str, git_token: &str) -> Self {
        Self {
            label: instance.name.clone(),
            instance_path: instance.instance_path.clone(),
            addons_path: instance.git_addons_path(),
            git_user: git_user.to_string(),
            git_token: git_token.to_string(),
            repo_name: naming::repository_name(&instance.name),
        }
    }

    fn repository_url(&self) -> String {
        format!(
            "https://{}:{}@github.com/{}/{}",
            self.git_user, self.git_token, self.git_user, self.repo_name
        )
    }
}

/// Freestyle project XML: poll the repository on push, copy the workspace into
/// the addons directory, restart the application service
pub fn job_config_xml(spec: &JobSpec) -> String {
    let script = deploy_script(spec);
    format!(
        r#"<?xml version='1.1' encoding='UTF-8'?>
<project>
    <actions/>
    <description>Automated deployment of custom addons from GitHub for Docker instance: {label}</description>
    <keepDependencies>false</keepDependencies>
    <properties/>
    <scm class="hudson.plugins.git.GitSCM" plugin="git@5.2.2">
        <configVersion>2</configVersion>
        <userRemoteConfigs>
            <hudson.plugins.git.UserRemoteConfig>
                <url>{url}</url>
            </hudson.plugins.git.UserRemoteConfig>
        </userRemoteConfigs>
        <branches>
            <hudson.plugins.git.BranchSpec>
                <name>**</name>
            </hudson.plugins.git.BranchSpec>
        </branches>
        <doGenerateSubmoduleConfigurations>false</doGenerateSubmoduleConfigurations>
        <submoduleCfg class="empty-list"/>
        <extensions/>
    </scm>
    <canRoam>true</canRoam>
    <disabled>false</disabled>
    <blockBuildWhenDownstreamBuilding>false</blockBuildWhenDownstreamBuilding>
    <blockBuildWhenUpstreamBuilding>false</blockBuildWhenUpstreamBuilding>
    <triggers>
        <com.cloudbees.jenkins.GitHubPushTrigger plugin="github@1.39.0">
            <spec/>
        </com.cloudbees.jenkins.GitHubPushTrigger>
    </triggers>
    <concurrentBuild>false</concurrentBuild>
    <builders>
        <hudson.tasks.Shell>
            <command><![CDATA[{script}]]></command>
        </hudson.tasks.Shell>
    </builders>
    <publishers/>
    <buildWrappers/>
</project>
"#,
        label = xml_escape(&spec.label),
        url = xml_escape(&spec.repository_url()),
        script = script.replace("]]>", "]]]]><![CDATA[>"),
    )
}

fn deploy_script(spec: &JobSpec) -> String {
    format!(
        r#"
#!/bin/bash

set -e

INSTANCE_NAME="{label}"
INSTANCE_PATH="{instance_path}"
ADDONS_PATH="{addons_path}"
COMPOSE_FILE="${{INSTANCE_PATH}}/docker-compose.yml"

echo "=== Starting Custom Addons Deployment ==="
echo "Instance: ${{INSTANCE_NAME}}"
echo "Addons Path: ${{ADDONS_PATH}}"

mkdir -p "${{ADDONS_PATH}}"
rm -rf "${{ADDONS_PATH}}"/*

cp -r "${{WORKSPACE}}"/* "${{ADDONS_PATH}}"/ 2>/dev/null || true
ls -la "${{ADDONS_PATH}}"/

if [ -f "${{COMPOSE_FILE}}" ]; then
    cd "${{INSTANCE_PATH}}"
    docker-compose restart odoo || docker-compose up -d odoo
else
    echo "WARNING: Compose file not found at ${{COMPOSE_FILE}}, skipping restart"
fi

echo "=== Deployment Completed ==="
"#,
        label = shell_quote_inner(&spec.label),
        instance_path = shell_quote_inner(&spec.instance_path.to_string_lossy()),
        addons_path = shell_quote_inner(&spec.addons_path.to_string_lossy()),
    )
}

/// Escape a value for use inside a double-quoted shell string
fn shell_quote_inner(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
