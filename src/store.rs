//! 입력 레코드 소스와 출력 싱크
//!
//! 프로토콜 코어는 두 가지 읽기 패턴(전체 개수, offset부터 최대 K개)과
//! 세션 종료 시 한 번의 쓰기만 필요로 한다.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// 입력 레코드 저장소
pub trait RecordSource {
    /// 전체 레코드 수
    fn count_records(&mut self) -> Result<usize>;

    /// `offset`번째 레코드부터 최대 `max`개 읽기
    fn read_records(&mut self, offset: usize, max: usize) -> Result<Vec<String>>;
}

/// 출력 저장소
pub trait OutputSink {
    /// Meta 수신 시점에 출력 이름 확인 (기본: 모두 허용)
    fn validate_name(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// 누적된 결과 줄 전체를 `name`에 기록
    fn write_lines(&mut self, name: &str, lines: &[String]) -> Result<()>;
}

/// 줄 단위 CSV 파일
///
/// 읽을 때마다 파일을 다시 연다. 파일 전체를 메모리에 올리지 않음.
#[derive(Debug, Clone)]
pub struct CsvFile {
    path: PathBuf,
}

impl CsvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<BufReader<File>> {
        File::open(&self.path)
            .map(BufReader::new)
            .map_err(|source| self.input_error(source))
    }

    fn input_error(&self, source: std::io::Error) -> Error {
        Error::InputSource {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordSource for CsvFile {
    fn count_records(&mut self) -> Result<usize> {
        let mut count = 0;
        for line in self.open()?.lines() {
            line.map_err(|e| self.input_error(e))?;
            count += 1;
        }
        Ok(count)
    }

    fn read_records(&mut self, offset: usize, max: usize) -> Result<Vec<String>> {
        self.open()?
            .lines()
            .skip(offset)
            .take(max)
            .map(|line| line.map_err(|e| self.input_error(e)))
            .collect()
    }
}

impl RecordSource for Vec<String> {
    fn count_records(&mut self) -> Result<usize> {
        Ok(self.len())
    }

    fn read_records(&mut self, offset: usize, max: usize) -> Result<Vec<String>> {
        Ok(self.iter().skip(offset).take(max).cloned().collect())
    }
}

/// 출력 디렉터리
///
/// 파일 이름은 원격에서 오므로 디렉터리 성분이 있으면 거부한다.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 출력 파일 경로 계산
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .filter(|f| f.to_str() == Some(name))
            .ok_or_else(|| Error::InvalidOutputName(name.to_string()))?;
        Ok(self.root.join(file_name))
    }
}

impl OutputSink for OutputDir {
    fn validate_name(&self, name: &str) -> Result<()> {
        self.resolve(name).map(|_| ())
    }

    fn write_lines(&mut self, name: &str, lines: &[String]) -> Result<()> {
        let path = self.resolve(name)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        for line in lines {
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(())
    }
}
