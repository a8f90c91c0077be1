use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        PlayheadError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(PlayheadError::graph("x").to_string().contains("graph error:"));
    assert!(PlayheadError::cache("x").to_string().contains("cache error:"));
    assert!(
        PlayheadError::decode("x")
            .to_string()
            .contains("decode error:")
    );
    assert!(
        PlayheadError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn io_and_other_preserve_source() {
    let io = PlayheadError::from(std::io::Error::other("disk gone"));
    assert!(io.to_string().contains("disk gone"));

    let err = PlayheadError::Other(anyhow::Error::new(std::io::Error::other("boom")));
    assert!(err.to_string().contains("boom"));
}
