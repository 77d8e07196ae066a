// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use policygate::*;

fn engine() -> Result<Engine> {
    Ok(Engine::with_builtin_policies()?)
}

const INSECURE_DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: api-service
  labels:
    app: api-service
spec:
  replicas: 2
  template:
    spec:
      containers:
        - name: api
          image: registry.local/api-service:1.4.2
"#;

const HARDENED_DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: api-service
  labels:
    app: api-service
spec:
  replicas: 2
  template:
    spec:
      containers:
        - name: api
          image: registry.local/api-service:1.4.2
          securityContext:
            runAsNonRoot: true
            readOnlyRootFilesystem: true
            allowPrivilegeEscalation: false
          resources:
            requests:
              cpu: 100m
              memory: 128Mi
            limits:
              cpu: 500m
              memory: 256Mi
          livenessProbe:
            httpGet:
              path: /healthz
              port: 8080
          readinessProbe:
            httpGet:
              path: /ready
              port: 8080
"#;

fn rds_plan(encrypted: bool, public: bool, retention: u64) -> Result<Document> {
    let plan = serde_json::json!({
        "format_version": "1.2",
        "resource_changes": [{
            "address": "aws_db_instance.postgres",
            "type": "aws_db_instance",
            "name": "postgres",
            "change": {
                "actions": ["create"],
                "after": {
                    "engine": "postgres",
                    "instance_class": "db.t3.micro",
                    "storage_encrypted": encrypted,
                    "publicly_accessible": public,
                    "backup_retention_period": retention
                }
            }
        }]
    });
    Ok(Document::from_json_str(&plan.to_string())?)
}

#[test]
fn insecure_deployment_is_denied() -> Result<()> {
    let doc = Document::from_yaml_str(INSECURE_DEPLOYMENT)?;
    let decision = engine()?.evaluate("kubernetes.security", &doc)?;

    assert!(!decision.allow);
    assert!(decision.deny.len() >= 4, "{:#?}", decision.deny);
    for expected in [
        "Container 'api' must set securityContext.runAsNonRoot to true",
        "Container 'api' must define resources.limits",
        "Container 'api' must define a livenessProbe",
        "Container 'api' must define a readinessProbe",
    ] {
        assert!(decision.deny.iter().any(|m| m == expected), "missing {expected}");
    }
    Ok(())
}

#[test]
fn hardened_deployment_is_allowed() -> Result<()> {
    let doc = Document::from_yaml_str(HARDENED_DEPLOYMENT)?;
    let engine = engine()?;
    let decision = engine.evaluate("kubernetes.security", &doc)?;
    assert!(decision.allow);
    assert!(decision.deny.is_empty());
    assert!(decision.warn.is_empty());

    let practices = engine.evaluate("kubernetes.bestpractices", &doc)?;
    assert!(practices.allow);
    assert_eq!(practices.warn, Vec::<String>::new());
    Ok(())
}

#[test]
fn insecure_database_plan_is_denied() -> Result<()> {
    let result = engine()?.evaluate_result("terraform.security", &rds_plan(false, true, 0)?)?;
    let decision = decide(&result);

    assert!(!decision.allow);
    assert_eq!(
        decision.deny,
        vec![
            "RDS instance 'aws_db_instance.postgres' must enable storage encryption",
            "RDS instance 'aws_db_instance.postgres' must not be publicly accessible",
            "RDS instance 'aws_db_instance.postgres' must retain backups for at least 7 days",
        ]
    );
    let policies: Vec<&str> = result.violations.iter().map(|v| v.rule.as_ref()).collect();
    assert_eq!(
        policies,
        vec!["require-encryption", "no-public-access", "require-backup-retention"]
    );
    assert_eq!(result.violations[0].severity, Some(Severity::High));
    assert_eq!(result.violations[2].severity, Some(Severity::Medium));
    Ok(())
}

#[test]
fn compliant_database_plan_is_allowed() -> Result<()> {
    let decision = engine()?.evaluate("terraform.security", &rds_plan(true, false, 7)?)?;
    assert!(decision.allow);
    assert!(decision.deny.is_empty());
    Ok(())
}

#[test]
fn large_instance_warns_without_blocking() -> Result<()> {
    let plan = Document::from_json_str(
        r#"{"resource_changes": [{
            "address": "aws_instance.worker",
            "type": "aws_instance",
            "change": {"after": {"instance_type": "t3.2xlarge", "ami": "ami-123"}}
        }]}"#,
    )?;
    let decision = engine()?.evaluate("terraform.cost", &plan)?;
    assert!(decision.allow);
    assert_eq!(
        decision.warn,
        vec!["Instance 'aws_instance.worker' uses large instance type t3.2xlarge; review sizing"]
    );
    Ok(())
}

#[test]
fn critical_vulnerabilities_block_images() -> Result<()> {
    let report = Document::from_json_str(
        r#"{
            "SchemaVersion": 2,
            "ArtifactName": "api-service-vulnerable:latest",
            "Results": [{
                "Target": "api-service-vulnerable:latest (debian 11.6)",
                "Vulnerabilities": [
                    {"VulnerabilityID": "CVE-2023-0286", "PkgName": "openssl", "InstalledVersion": "1.1.1n", "Severity": "CRITICAL"},
                    {"VulnerabilityID": "CVE-2022-4450", "PkgName": "openssl", "InstalledVersion": "1.1.1n", "Severity": "HIGH"},
                    {"VulnerabilityID": "CVE-2022-1304", "PkgName": "e2fsprogs", "InstalledVersion": "1.46.2", "Severity": "MEDIUM"}
                ]
            }, {
                "Target": "app/requirements.txt"
            }]
        }"#,
    )?;
    let decision = engine()?.evaluate("vulnerability.scan", &report)?;
    assert!(!decision.allow);
    assert_eq!(
        decision.deny,
        vec!["CVE-2023-0286 (CRITICAL) in openssl 1.1.1n on api-service-vulnerable:latest (debian 11.6)"]
    );
    assert_eq!(decision.warn.len(), 1);
    Ok(())
}

#[test]
fn open_security_group_is_denied_once_per_port() -> Result<()> {
    let plan = Document::from_json_str(
        r#"{"resource_changes": [{
            "address": "aws_security_group.db",
            "type": "aws_security_group",
            "change": {"after": {"ingress": [
                {"from_port": 5432, "to_port": 5432, "cidr_blocks": ["0.0.0.0/0"]},
                {"from_port": 443, "to_port": 443, "cidr_blocks": ["0.0.0.0/0"]},
                {"from_port": 22, "to_port": 22, "cidr_blocks": ["10.0.0.0/8"]}
            ]}}
        }]}"#,
    )?;
    let decision = engine()?.evaluate("terraform.security", &plan)?;
    assert_eq!(
        decision.deny,
        vec!["Security group 'aws_security_group.db' allows 0.0.0.0/0 ingress on port 5432"]
    );
    Ok(())
}

#[test]
fn batches_follow_input_order() -> Result<()> {
    let docs = vec![
        rds_plan(true, false, 7)?,
        rds_plan(false, false, 7)?,
        rds_plan(true, false, 30)?,
    ];
    let decisions = engine()?.evaluate_batch("terraform.security", &docs)?;
    let allows: Vec<bool> = decisions.iter().map(|d| d.allow).collect();
    assert_eq!(allows, vec![true, false, true]);
    assert_eq!(decisions[1].deny.len(), 1);
    Ok(())
}
