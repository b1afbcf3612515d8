use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Class id to category name mapping. The line index in the labels file is
/// the class id the model emits.
#[derive(Debug, Clone)]
pub struct ClassLabels {
    categories: Vec<String>,
}

impl ClassLabels {
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    pub fn load(filepath: &Path) -> io::Result<Self> {
        let file = File::open(filepath)?;
        let reader = io::BufReader::new(file);
        let mut categories = Vec::new();

        for line_result in reader.lines() {
            let line = line_result?;
            let category = line.trim();
            if category.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Empty label at line {}", categories.len() + 1),
                ));
            }
            categories.push(category.to_string());
        }

        if categories.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Labels file contains no categories",
            ));
        }

        Ok(Self::new(categories))
    }

    pub fn resolve(&self, class_id: u32) -> Option<&str> {
        self.categories.get(class_id as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_categories_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "plastic-bottle").unwrap();
        writeln!(file, "aluminum-can").unwrap();

        let labels = ClassLabels::load(file.path()).unwrap();

        assert_eq!(labels.resolve(0), Some("plastic-bottle"));
        assert_eq!(labels.resolve(1), Some("aluminum-can"));
        assert_eq!(labels.resolve(2), None);
    }

    #[test]
    fn rejects_an_empty_labels_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(ClassLabels::load(file.path()).is_err());
    }

    #[test]
    fn rejects_blank_label_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "plastic-bottle").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "aluminum-can").unwrap();

        assert!(ClassLabels::load(file.path()).is_err());
    }
}
