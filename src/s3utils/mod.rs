use anyhow::bail;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VALID_BUCKET_NAME: Regex =
        Regex::new(r#"^[A-Za-z0-9][A-Za-z0-9\.\-_:]{1,61}[A-Za-z0-9]$"#).unwrap();
    static ref VALID_BUCKET_NAME_STRICT: Regex =
        Regex::new(r#"^[a-z0-9][a-z0-9\.\-]{1,61}[a-z0-9]$"#).unwrap();
    static ref IP_ADDRESS: Regex = Regex::new(r#"^(\d+\.){3}\d+$"#).unwrap();
}

// Longest object prefix accepted by heal and object APIs.
const MAX_OBJECT_PREFIX_LEN: usize = 1024;

// Checks if we have a valid input bucket name.
pub fn check_valid_bucket_name(bucket_name: &str) -> anyhow::Result<()> {
    check_bucket_name_common(bucket_name, false)
}

// Checks if we have a valid input bucket name.
// This is a stricter version.
// - http://docs.aws.amazon.com/AmazonS3/latest/dev/UsingBucket.html
pub fn check_valid_bucket_name_strict(bucket_name: &str) -> anyhow::Result<()> {
    check_bucket_name_common(bucket_name, true)
}

fn check_bucket_name_common(bucket_name: &str, strict: bool) -> anyhow::Result<()> {
    if bucket_name.trim().is_empty() {
        bail!("Bucket name cannot be empty");
    }
    if bucket_name.len() < 3 {
        bail!("Bucket name cannot be shorter than 3 characters");
    }
    if bucket_name.len() > 63 {
        bail!("Bucket name cannot be longer than 63 characters");
    }
    if IP_ADDRESS.is_match(bucket_name) {
        bail!("Bucket name cannot be an ip address");
    }
    if bucket_name.contains("..") || bucket_name.contains(".-") || bucket_name.contains("-.") {
        bail!("Bucket name contains invalid characters");
    }
    if strict && !VALID_BUCKET_NAME_STRICT.is_match(bucket_name) {
        bail!("Bucket name contains invalid characters");
    }
    if !VALID_BUCKET_NAME.is_match(bucket_name) {
        bail!("Bucket name contains invalid characters");
    }
    Ok(())
}

// Checks if an object prefix is usable as a heal target or listing
// filter. An empty prefix is valid.
pub fn check_valid_object_prefix(object_prefix: &str) -> anyhow::Result<()> {
    if object_prefix.len() > MAX_OBJECT_PREFIX_LEN {
        bail!("Object prefix cannot be longer than 1024 bytes");
    }
    if object_prefix.contains('\\') {
        bail!("Object prefix contains invalid characters");
    }
    if object_prefix
        .split('/')
        .any(|component| component == "." || component == "..")
    {
        bail!("Object prefix contains a path traversal component");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_valid_bucket_name() {
        let valid = vec!["my-bucket", "a.b.c", "abc", "bucket-1_2:3"];
        for name in valid {
            assert!(check_valid_bucket_name(name).is_ok(), "{}", name);
        }

        let long_name = "x".repeat(64);
        let invalid = vec![
            "",
            "  ",
            "ab",
            "192.168.1.1",
            "my..bucket",
            "my.-bucket",
            "my-.bucket",
            "-starts-with-dash",
            "ends-with-dash-",
            &long_name,
        ];
        for name in invalid {
            assert!(check_valid_bucket_name(name).is_err(), "{}", name);
        }
    }

    #[test]
    fn test_check_valid_bucket_name_strict() {
        assert!(check_valid_bucket_name_strict("my-bucket").is_ok());
        assert!(check_valid_bucket_name_strict("My-Bucket").is_err());
        assert!(check_valid_bucket_name_strict("under_score").is_err());
    }

    #[test]
    fn test_check_valid_object_prefix() {
        let valid = vec!["", "photos/", "photos/2021/", "a b c", "deep/ly/nest/ed"];
        for prefix in valid {
            assert!(check_valid_object_prefix(prefix).is_ok(), "{}", prefix);
        }

        let invalid = vec!["back\\slash", "../escape", "a/../b", "a/./b"];
        for prefix in invalid {
            assert!(check_valid_object_prefix(prefix).is_err(), "{}", prefix);
        }
        assert!(check_valid_object_prefix(&"p".repeat(1025)).is_err());
    }
}
