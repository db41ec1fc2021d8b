use super::*;

#[test]
fn constructors_build_the_matching_variant() {
    assert!(matches!(
        ProteanError::schema("bad"),
        ProteanError::Schema(_)
    ));
    assert!(matches!(
        ProteanError::validation("bad"),
        ProteanError::Validation(_)
    ));
    assert!(matches!(ProteanError::link("bad"), ProteanError::Link(_)));
}

#[test]
fn display_carries_the_taxonomy_prefix() {
    assert_eq!(
        ProteanError::schema("unknown discriminator 9").to_string(),
        "schema error: unknown discriminator 9"
    );
    assert_eq!(
        ProteanError::validation("no roots").to_string(),
        "validation error: no roots"
    );
    assert_eq!(
        ProteanError::link("child not linked").to_string(),
        "link error: child not linked"
    );
}

#[test]
fn anyhow_errors_pass_through() {
    let err: ProteanError = anyhow::anyhow!("io exploded").into();
    assert_eq!(err.to_string(), "io exploded");
}
