use std::fmt;

use crate::error::RpcPathError;

/// A parsed method name: `{package}.{service}/{method}`
///
/// Example: `calculator.CalculatorService/Sum`
/// - `package`: `calculator`
/// - `service`: `CalculatorService`
/// - `method`: `Sum`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodPath {
    pub package: String,
    pub service: String,
    pub method: String,
}

impl MethodPath {
    /// Parse a method path. A leading `/` is tolerated and the package may be dotted.
    pub fn parse(path: &str) -> Result<Self, RpcPathError> {
        let path = path.strip_prefix('/').unwrap_or(path);

        let (service_path, method) = path
            .rsplit_once('/')
            .ok_or_else(|| RpcPathError::Invalid(format!("method path must contain '/': '{path}'")))?;

        let (package, service) = service_path.rsplit_once('.').ok_or_else(|| {
            RpcPathError::Invalid(format!(
                "service path must be package.service: '{service_path}'"
            ))
        })?;

        if package.is_empty() || service.is_empty() || method.is_empty() || package.contains('/')
        {
            return Err(RpcPathError::Invalid(format!(
                "package, service, and method must be non-empty single segments: '{path}'"
            )));
        }

        Ok(MethodPath {
            package: package.to_owned(),
            service: service.to_owned(),
            method: method.to_owned(),
        })
    }

    /// `{package}.{service}`
    pub fn full_service(&self) -> String {
        format!("{}.{}", self.package, self.service)
    }
}

impl fmt::Display for MethodPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.package, self.service, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_path_parse() {
        let path = MethodPath::parse("calculator.CalculatorService/Sum").unwrap();
        assert_eq!(path.package, "calculator");
        assert_eq!(path.service, "CalculatorService");
        assert_eq!(path.method, "Sum");
        assert_eq!(path.full_service(), "calculator.CalculatorService");
        assert_eq!(path.to_string(), "calculator.CalculatorService/Sum");
    }

    #[test]
    fn test_leading_slash_is_normalized_away() {
        let path = MethodPath::parse("/greet.GreetService/Greet").unwrap();
        assert_eq!(path.to_string(), "greet.GreetService/Greet");
    }

    #[test]
    fn test_nested_package() {
        let path = MethodPath::parse("com.example.greet.GreetService/LongGreet").unwrap();
        assert_eq!(path.package, "com.example.greet");
        assert_eq!(path.service, "GreetService");
        assert_eq!(path.method, "LongGreet");
    }

    #[test]
    fn test_missing_method() {
        assert!(MethodPath::parse("calculator.CalculatorService").is_err());
        assert!(MethodPath::parse("calculator.CalculatorService/").is_err());
    }

    #[test]
    fn test_missing_package() {
        assert!(MethodPath::parse("CalculatorService/Sum").is_err());
        assert!(MethodPath::parse(".CalculatorService/Sum").is_err());
    }

    #[test]
    fn test_extra_segments_rejected() {
        assert!(MethodPath::parse("client-1/calculator.CalculatorService/Sum").is_err());
    }
}
