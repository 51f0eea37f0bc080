//! Deterministic node names.
//!
//! Names are `<kind><Suffix><Subject...>` where every segment after the kind is
//! capitalized, e.g. `pushStagingApi` or `deployStagingApiStage`.

/// Uppercase the first character, leave the rest untouched.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join(kind: &str, segments: &[&str]) -> String {
    let mut name = kind.to_string();
    for segment in segments {
        name.push_str(&capitalize(segment));
    }
    name
}

pub fn login(suffix: &str) -> String {
    join("login", &[suffix])
}

pub fn prepare(suffix: &str, service: &str) -> String {
    join("prepare", &[suffix, service])
}

pub fn build(suffix: &str, service: &str) -> String {
    join("build", &[suffix, service])
}

pub fn scan(suffix: &str, service: &str) -> String {
    join("scan", &[suffix, service])
}

pub fn push(suffix: &str, service: &str) -> String {
    join("push", &[suffix, service])
}

/// Deploy of one service into one namespace.
pub fn deploy(suffix: &str, service: &str, namespace: &str) -> String {
    join("deploy", &[suffix, service, namespace])
}

/// All namespace deploys of one service for one profile.
pub fn profile_deploy(suffix: &str, service: &str) -> String {
    join("deploy", &[suffix, service])
}

/// Every deploy into `namespace`, across services and profiles.
pub fn namespace_deploy(namespace: &str) -> String {
    join("deploy", &[namespace])
}

pub fn chart_push(suffix: &str, service: &str) -> String {
    join("chartPush", &[suffix, service])
}
