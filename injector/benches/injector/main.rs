use injector::{Injector, options::InjectOptions, reslist::List};

fn main() {
    divan::main();
}

fn inject(fixture: &str) -> Vec<List> {
    let input = std::fs::read(format!("tests/injector/testdata/{fixture}/input.yaml")).unwrap();
    Injector::new(InjectOptions::default()).inject(&input).unwrap()
}

#[divan::bench]
fn inject_powerflex() -> Vec<List> {
    inject("powerflex")
}

#[divan::bench]
fn inject_powermax_reverse_proxy() -> Vec<List> {
    inject("powermax-reverse-proxy")
}

#[divan::bench]
fn inject_powerscale() -> Vec<List> {
    inject("powerscale")
}

#[divan::bench]
fn inject_multi_document() -> Vec<List> {
    inject("multi-document")
}
