//! Path canonicalization for node names.

/// Lexically canonicalize a path, removing redundant components.
/// Does not access the disk, but only simplifies things like
/// "foo/./bar" => "foo/bar", so that two spellings of the same file
/// name the same node.
pub fn canon_path<T: AsRef<str>>(inpath: T) -> String {
    let path = inpath.as_ref();
    let absolute = path.starts_with('/');
    let mut components: Vec<&str> = Vec::new();
    // Number of leading ".." components, which can't be collapsed in a
    // relative path.
    let mut ups = 0;
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if components.len() > ups {
                    components.pop();
                } else if !absolute {
                    components.push("..");
                    ups += 1;
                }
            }
            _ => components.push(comp),
        }
    }

    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&components.join("/"));
    if out.is_empty() {
        out.push('.');
    }
    out
}
