//! 编程语言与默认代码模板

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 支持的编程语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Java,
    Cpp,
}

impl Language {
    pub fn id(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }

    /// 提交给判题服务的文件名
    pub fn filename(&self) -> String {
        format!("Solution.{}", self.extension())
    }

    /// 默认代码模板
    pub fn template(&self) -> &'static str {
        match self {
            Language::Python => {
                "def solution(input_data):\n    \"\"\"\n    Your solution here\n    \"\"\"\n    pass"
            }
            Language::Java => {
                "class Solution {\n    public String solution(String input) {\n        // Your code here\n        \n    }\n}"
            }
            Language::Cpp => {
                "#include <iostream>\n#include <string>\nusing namespace std;\n\nclass Solution {\npublic:\n    string solution(string input) {\n        // Your code here\n        \n    }\n};"
            }
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            other => Err(format!("不支持的语言: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_and_parse() {
        assert_eq!(Language::Cpp.filename(), "Solution.cpp");
        assert_eq!("C++".parse::<Language>().unwrap(), Language::Cpp);
        assert!("rust".parse::<Language>().is_err());
        assert!(Language::Java.template().contains("class Solution"));
    }
}
