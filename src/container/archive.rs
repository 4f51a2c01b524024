//! Tar archives for build contexts and folder uploads.

use crate::container::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;

/// A gzipped build context and the Dockerfile path within it.
#[derive(Debug)]
pub(crate) struct BuildContext {
    pub bytes: Vec<u8>,
    pub dockerfile: String,
}

/// Pack a build context directory.
///
/// A Dockerfile inside the context is referenced by its relative path. One
/// outside the context is added to the archive under a unique hidden name.
pub(crate) fn build_context(context: &Path, dockerfile: Option<&Path>) -> Result<BuildContext> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    let dockerfile_name;
    {
        let mut builder = tar::Builder::new(&mut encoder);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", context)?;

        dockerfile_name = match dockerfile {
            None => "Dockerfile".to_string(),
            Some(path) => match relative_to(path, context) {
                Some(relative) => relative,
                None => {
                    let name = format!(".dockerfile.{}", uuid::Uuid::new_v4().simple());
                    let contents = std::fs::read(path)?;
                    let mut header = tar::Header::new_gnu();
                    header.set_size(contents.len() as u64);
                    header.set_mode(0o644);
                    header.set_cksum();
                    builder.append_data(&mut header, &name, contents.as_slice())?;
                    name
                }
            },
        };

        builder.finish()?;
    }

    Ok(BuildContext {
        bytes: encoder.finish()?,
        dockerfile: dockerfile_name,
    })
}

/// Pack a directory's contents, for upload into a container path.
pub(crate) fn folder_archive(source: &Path) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", source)?;
    Ok(builder.into_inner()?)
}

fn relative_to(path: &Path, base: &Path) -> Option<String> {
    let path = path.canonicalize().ok()?;
    let base = base.canonicalize().ok()?;
    let relative = path.strip_prefix(&base).ok()?;
    Some(relative.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn entries(bytes: &[u8], gzipped: bool) -> Vec<(String, String)> {
        let reader: Box<dyn Read> = if gzipped {
            Box::new(GzDecoder::new(bytes))
        } else {
            Box::new(bytes)
        };
        let mut archive = tar::Archive::new(reader);
        let mut found = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.header().entry_type().is_file() {
                let path = entry.path().unwrap().to_string_lossy().to_string();
                let mut contents = String::new();
                entry.read_to_string(&mut contents).unwrap();
                found.push((path.trim_start_matches("./").to_string(), contents));
            }
        }
        found
    }

    #[test]
    fn test_context_with_inner_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docker")).unwrap();
        std::fs::write(dir.path().join("docker/Dockerfile"), "FROM alpine\n").unwrap();
        std::fs::write(dir.path().join("app.py"), "print('hi')\n").unwrap();

        let context =
            build_context(dir.path(), Some(&dir.path().join("docker/Dockerfile"))).unwrap();
        assert_eq!(context.dockerfile, "docker/Dockerfile");

        let files = entries(&context.bytes, true);
        assert!(files.iter().any(|(p, _)| p == "app.py"));
        assert!(files.iter().any(|(p, _)| p == "docker/Dockerfile"));
    }

    #[test]
    fn test_context_with_outer_dockerfile() {
        let context_dir = tempfile::tempdir().unwrap();
        std::fs::write(context_dir.path().join("app.py"), "print('hi')\n").unwrap();
        let other = tempfile::tempdir().unwrap();
        let dockerfile = other.path().join("Dockerfile.test");
        std::fs::write(&dockerfile, "FROM alpine\nENV FOO=bar\n").unwrap();

        let context = build_context(context_dir.path(), Some(&dockerfile)).unwrap();
        assert!(context.dockerfile.starts_with(".dockerfile."));

        let files = entries(&context.bytes, true);
        let (_, contents) = files
            .iter()
            .find(|(p, _)| *p == context.dockerfile)
            .unwrap();
        assert!(contents.contains("ENV FOO=bar"));
    }

    #[test]
    fn test_context_default_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        let context = build_context(dir.path(), None).unwrap();
        assert_eq!(context.dockerfile, "Dockerfile");
    }

    #[test]
    fn test_folder_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.json"), r#"{"request":{}}"#).unwrap();

        let bytes = folder_archive(dir.path()).unwrap();
        let files = entries(&bytes, false);
        assert_eq!(
            files,
            vec![("hello.json".to_string(), r#"{"request":{}}"#.to_string())]
        );
    }
}
