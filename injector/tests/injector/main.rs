use std::path::Path;

use anyhow::Context;
use injector::{
    Injector,
    index::index,
    manifest::name::{AUTH_CONFIG_SECRET, PROXY_CONTAINER},
    options::{InjectOptions, MemoryCertificates},
    reslist::List,
    transform::Workload,
};
use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::Secret,
};

datatest_stable::harness! {
    { test = test, root = "tests/injector/testdata", pattern = r".*/input.yaml" },
}

fn injector() -> Injector<MemoryCertificates> {
    Injector::with_certificates(
        InjectOptions {
            image_addr: "dellemc/csm-authorization-sidecar:v1.0.0".into(),
            proxy_host: "csm-authorization.example.com".into(),
            insecure: true,
            root_certificate: Some("root.pem".into()),
            ..Default::default()
        },
        MemoryCertificates::default().with("root.pem", "-----BEGIN CERTIFICATE-----\n"),
    )
}

fn test(path: &Path) -> datatest_stable::Result<()> {
    Ok(check(path)?)
}

/// Fixtures with an `expected.stderr` must fail with that message, all others must succeed with
/// the objects in `expected.yaml`.
fn check(path: &Path) -> anyhow::Result<()> {
    let dir = path.parent().context("input has no parent directory")?;
    let input = std::fs::read(path).context("reading input")?;
    let expected_yaml = dir.join("expected.yaml");
    let expected_stderr = dir.join("expected.stderr");

    match injector().inject(&input) {
        Ok(outputs) => {
            anyhow::ensure!(
                !expected_stderr.exists(),
                "{} expects an error but injection succeeded",
                path.display()
            );
            let mut actual = String::new();
            for (i, list) in outputs.iter().enumerate() {
                if i > 0 {
                    actual.push_str("---\n");
                }
                actual.push_str(&list.to_yaml()?);
                check_output(list)?;
            }
            check_rerun(&input, &outputs)?;
            snapshot(&expected_yaml, &actual, same_documents)?;
        }
        Err(err) => {
            anyhow::ensure!(
                !expected_yaml.exists(),
                "{} expects output but injection failed: {err:#}",
                path.display()
            );
            snapshot(&expected_stderr, &format!("{err:#}\n"), |expected, actual| {
                Ok(expected == actual)
            })?;
        }
    }
    Ok(())
}

/// Compares YAML streams by value so that quoting and key order do not matter.
fn same_documents(expected: &str, actual: &str) -> anyhow::Result<bool> {
    let expected = injector::yaml::documents(expected.as_bytes()).context("parsing snapshot")?;
    let actual = injector::yaml::documents(actual.as_bytes())?;
    Ok(expected == actual)
}

/// Every run yields the authorization config and exactly one sidecar per workload.
fn check_output(list: &List) -> anyhow::Result<()> {
    anyhow::ensure!(
        index::<Secret>(list)?.contains_key(AUTH_CONFIG_SECRET),
        "no `{AUTH_CONFIG_SECRET}` Secret in output"
    );
    for (name, deployment) in index::<Deployment>(list)? {
        anyhow::ensure!(proxies(&deployment) == 1, "Deployment `{name}` has {} proxies", proxies(&deployment));
    }
    for (name, daemon_set) in index::<DaemonSet>(list)? {
        anyhow::ensure!(proxies(&daemon_set) == 1, "DaemonSet `{name}` has {} proxies", proxies(&daemon_set));
    }
    Ok(())
}

/// Running again over the applied output must produce the same objects.
fn check_rerun(input: &[u8], outputs: &[List]) -> anyhow::Result<()> {
    let documents = injector::yaml::documents(input)?;
    for (document, output) in documents.into_iter().zip(outputs) {
        let applied = apply(&List::from_value(document)?, output);
        let rerun = injector().inject_list(&applied)?;
        let (expected, actual) = (output.to_yaml()?, rerun.to_yaml()?);
        if expected != actual {
            let chunks = dissimilar::diff(&expected, &actual);
            anyhow::bail!("second run differs:\n{}", format_chunks(chunks));
        }
    }
    Ok(())
}

fn apply(input: &List, output: &List) -> List {
    let mut applied = input
        .iter()
        .filter(|old| !output.iter().any(|new| new.id() == old.id()))
        .cloned()
        .collect::<List>();
    for resource in output.iter() {
        applied.push(resource.clone());
    }
    applied
}

fn proxies<W: Workload>(workload: &W) -> usize {
    workload
        .pod_spec()
        .map_or(0, |pod| pod.containers.iter().filter(|c| c.name == PROXY_CONTAINER).count())
}

fn snapshot(
    path: &Path,
    actual: &str,
    matches: impl Fn(&str, &str) -> anyhow::Result<bool>,
) -> anyhow::Result<()> {
    if std::env::var("UPDATE_SNAPSHOTS").is_ok() {
        std::fs::write(path, actual).context("writing snapshot")?;
        return Ok(());
    }
    anyhow::ensure!(
        path.exists(),
        "missing snapshot {}, rerun with UPDATE_SNAPSHOTS=1 to create it",
        path.display()
    );

    let expected = std::fs::read_to_string(path).context("reading snapshot")?;
    if matches(&expected, actual)? {
        return Ok(());
    }

    eprintln!(
        "Snapshot mismatch for {}:\n{}",
        path.display(),
        format_chunks(dissimilar::diff(&expected, actual))
    );
    anyhow::bail!("Snapshot mismatch for {}", path.display())
}

fn format_chunks(chunks: Vec<dissimilar::Chunk>) -> String {
    let mut buf = String::new();
    for chunk in chunks {
        let formatted = match chunk {
            dissimilar::Chunk::Equal(text) => text.into(),
            dissimilar::Chunk::Delete(text) => format!("\x1b[4m\x1b[31m{text}\x1b[0m"),
            dissimilar::Chunk::Insert(text) => format!("\x1b[4m\x1b[32m{text}\x1b[0m"),
        };
        buf.push_str(&formatted);
    }
    buf
}
