//! Suite document decoding and structural validation.

use crate::suite::TestSuite;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("decode: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Parse a YAML (or JSON) suite document and validate it.
///
/// Unknown fields are rejected by the decoder; structural rules (non-empty
/// names, non-empty scenario and step lists, method/URL present) are checked
/// afterwards. Step methods are normalized to upper case.
///
/// # Errors
///
/// Returns [`ParseError::Decode`] for malformed documents or unknown fields,
/// [`ParseError::Validation`] for structural violations.
pub fn parse_bytes(bytes: &[u8]) -> Result<TestSuite, ParseError> {
    let mut suite: TestSuite =
        serde_yml::from_slice(bytes).map_err(|e| ParseError::Decode(e.to_string()))?;
    validate(&suite)?;

    for sc in &mut suite.scenarios {
        for st in &mut sc.steps {
            st.request.method = st.request.method.to_uppercase();
        }
    }
    Ok(suite)
}

fn validate(suite: &TestSuite) -> Result<(), ParseError> {
    if suite.name.is_empty() {
        return Err(ParseError::Validation("suite.name must not be empty".into()));
    }
    if suite.scenarios.is_empty() {
        return Err(ParseError::Validation(
            "suite.scenarios must not be empty".into(),
        ));
    }
    for (i, sc) in suite.scenarios.iter().enumerate() {
        if sc.name.is_empty() {
            return Err(ParseError::Validation(format!(
                "scenario[{i}].name must not be empty"
            )));
        }
        if sc.steps.is_empty() {
            return Err(ParseError::Validation(format!(
                "scenario[{i}].steps must not be empty"
            )));
        }
        for (j, st) in sc.steps.iter().enumerate() {
            if st.request.method.is_empty() {
                return Err(ParseError::Validation(format!(
                    "scenario[{i}].step[{j}].request.method must not be empty"
                )));
            }
            if st.request.url.is_empty() {
                return Err(ParseError::Validation(format!(
                    "scenario[{i}].step[{j}].request.url must not be empty"
                )));
            }
        }
    }
    Ok(())
}
