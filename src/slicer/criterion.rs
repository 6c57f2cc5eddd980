use super::Error;
use crate::program::{MethodId, Program};
use crate::trace::Instance;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Point of interest of a slice
///
/// Written `Class.method[:line][:(occurrence)][:{var,var}]`, eg. `Simple1.main:8:{b}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SlicingCriterion {
    pub class_name: String,
    pub method_name: String,
    pub line: Option<u32>,

    /// Which match to select, counting from 1 backwards from the end of the trace
    ///
    /// `None` selects every match.
    pub occurrence: Option<u64>,

    /// Local variables whose values are of interest
    ///
    /// Without variables, everything read by the matching instructions is of interest.
    pub variables: Vec<String>,
}

impl SlicingCriterion {
    /// Parse a comma separated list of criteria
    pub fn parse_list(input: &str) -> Result<Vec<SlicingCriterion>, Error> {
        let mut criteria = vec![];
        let mut depth = 0i32;
        let mut start = 0;
        for (idx, c) in input.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                ',' if depth == 0 => {
                    criteria.push(input[start..idx].parse()?);
                    start = idx + 1;
                }
                _ => (),
            }
        }
        criteria.push(input[start..].parse()?);
        Ok(criteria)
    }

    /// Resolve the criterion against a program
    pub fn instantiate(&self, program: &Program) -> Result<CriterionInstance, Error> {
        let method = program
            .find_method(&self.class_name, &self.method_name)
            .ok_or_else(|| {
                Error::UnknownMethod(format!("{}.{}", self.class_name, self.method_name))
            })?;
        for variable in &self.variables {
            if !method.local_variables.iter().any(|var| &var.name == variable) {
                return Err(Error::UnknownVariable {
                    method: method.full_name(),
                    variable: variable.clone(),
                });
            }
        }
        Ok(CriterionInstance {
            criterion: self.clone(),
            method: method.id,
            runs: HashMap::new(),
            seen: 0,
        })
    }
}

impl FromStr for SlicingCriterion {
    type Err = Error;

    fn from_str(input: &str) -> Result<SlicingCriterion, Error> {
        let input = input.trim();
        let malformed = || Error::MalformedCriterion(input.to_string());

        let (method, rest) = match input.find(':') {
            Some(idx) => (&input[..idx], Some(&input[idx + 1..])),
            None => (input, None),
        };
        let dot = method.rfind('.').ok_or_else(malformed)?;
        let (class_name, method_name) = (&method[..dot], &method[dot + 1..]);
        if class_name.is_empty() || method_name.is_empty() {
            return Err(malformed());
        }

        let mut criterion = SlicingCriterion {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            line: None,
            occurrence: None,
            variables: vec![],
        };
        for part in rest.into_iter().flat_map(|rest| rest.split(':')) {
            let part = part.trim();
            if let Some(occurrence) = part.strip_prefix('(') {
                let occurrence = occurrence.strip_suffix(')').ok_or_else(malformed)?;
                let occurrence: u64 = occurrence.trim().parse().map_err(|_| malformed())?;
                if occurrence == 0 || criterion.occurrence.is_some() {
                    return Err(malformed());
                }
                criterion.occurrence = Some(occurrence);
            } else if let Some(variables) = part.strip_prefix('{') {
                let variables = variables.strip_suffix('}').ok_or_else(malformed)?;
                criterion.variables.extend(
                    variables
                        .split(',')
                        .map(str::trim)
                        .filter(|var| !var.is_empty())
                        .map(str::to_string),
                );
                if criterion.variables.is_empty() {
                    return Err(malformed());
                }
            } else {
                let line: u32 = part.parse().map_err(|_| malformed())?;
                if criterion.line.is_some() {
                    return Err(malformed());
                }
                criterion.line = Some(line);
            }
        }
        Ok(criterion)
    }
}

impl fmt::Display for SlicingCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        if let Some(occurrence) = self.occurrence {
            write!(f, ":({})", occurrence)?;
        }
        if !self.variables.is_empty() {
            write!(f, ":{{{}}}", self.variables.join(","))?;
        }
        Ok(())
    }
}

/// Outcome of testing an instance against a criterion
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Match {
    No,

    /// First instance (backwards) of a selected match event
    RunStart,

    /// Further instance of a selected match event
    RunContinued,
}

impl Match {
    pub fn is_match(self) -> bool {
        self != Match::No
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Run {
    Selected,
    Skipped,
}

/// A criterion bound to a program, matching instances as they go by
///
/// Consecutive instances (at one stack depth) matching the method and line form a single match
/// event, so that every instruction of a source line is matched together. Labels neither match
/// nor end a run, and instances of callees don't end the run of their caller.
#[derive(Clone, Debug)]
pub struct CriterionInstance {
    criterion: SlicingCriterion,
    method: MethodId,
    runs: HashMap<u32, Run>,

    /// Match events seen so far
    seen: u64,
}

impl CriterionInstance {
    pub fn criterion(&self) -> &SlicingCriterion {
        &self.criterion
    }

    pub fn method(&self) -> MethodId {
        self.method
    }

    /// Whether `instance` belongs to a selected match event
    pub fn matches(&mut self, program: &Program, instance: &Instance) -> Match {
        let instruction = program.instruction(instance.instruction);
        let depth = instance.stack_depth;
        if instruction.opcode.is_label() {
            return Match::No;
        }

        let hit = instance.method == self.method
            && self
                .criterion
                .line
                .map_or(true, |line| instruction.line == Some(line));
        if !hit {
            self.runs.remove(&depth);
            return Match::No;
        }

        let (run, started) = match self.runs.get(&depth) {
            Some(run) => (*run, false),
            None => {
                self.seen += 1;
                let run = match self.criterion.occurrence {
                    Some(occurrence) if occurrence != self.seen => Run::Skipped,
                    _ => Run::Selected,
                };
                self.runs.insert(depth, run);
                (run, true)
            }
        };
        match run {
            Run::Skipped => Match::No,
            Run::Selected if started => Match::RunStart,
            Run::Selected => Match::RunContinued,
        }
    }

    /// Forget the run at `depth` (the frame there changed)
    pub fn reset_depth(&mut self, depth: u32) {
        self.runs.remove(&depth);
    }

    /// Local variable slots named by the criterion, as seen from `instance`
    pub fn variable_slots(&self, program: &Program, instance: &Instance) -> Vec<u16> {
        let method = program.method(self.method);
        self.criterion
            .variables
            .iter()
            .filter_map(|name| method.local_variable(name, instance.instruction))
            .map(|var| var.slot)
            .collect()
    }
}
