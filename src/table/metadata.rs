use crate::dtype::DataType;
use crate::utils::error::DalError;

/// Element order of dense table storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataLayout {
    RowMajor,
    ColumnMajor,
}

/// Statistical nature of a column's values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Nominal,
    Ordinal,
    Interval,
    Ratio,
}

impl FeatureType {
    /// Ratio for floating columns, ordinal for integer columns.
    pub fn default_for(data_type: DataType) -> FeatureType {
        if data_type.is_floating_point() {
            FeatureType::Ratio
        } else {
            FeatureType::Ordinal
        }
    }
}

/// Per-column data and feature types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableMetadata {
    data_types: Vec<DataType>,
    feature_types: Vec<FeatureType>,
}

impl TableMetadata {
    pub fn new(data_types: Vec<DataType>, feature_types: Vec<FeatureType>) -> Result<Self, DalError> {
        if data_types.len() != feature_types.len() {
            return Err(DalError::InvalidArgument(format!(
                "{} data types given for {} feature types",
                data_types.len(),
                feature_types.len()
            )));
        }
        Ok(Self {
            data_types,
            feature_types,
        })
    }

    /// Every one of `column_count` columns has `data_type` and its default
    /// feature type.
    pub fn homogen(data_type: DataType, column_count: usize) -> Self {
        Self {
            data_types: vec![data_type; column_count],
            feature_types: vec![FeatureType::default_for(data_type); column_count],
        }
    }

    pub fn column_count(&self) -> usize {
        self.data_types.len()
    }

    #[track_caller]
    pub fn get_data_type(&self, column: usize) -> DataType {
        self.data_types[column]
    }

    #[track_caller]
    pub fn get_feature_type(&self, column: usize) -> FeatureType {
        self.feature_types[column]
    }

    #[track_caller]
    pub fn set_feature_type(&mut self, column: usize, feature_type: FeatureType) -> &mut Self {
        self.feature_types[column] = feature_type;
        self
    }

    pub fn data_types(&self) -> &[DataType] {
        &self.data_types
    }

    pub fn feature_types(&self) -> &[FeatureType] {
        &self.feature_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homogen_defaults_feature_types() {
        let meta = TableMetadata::homogen(DataType::Float32, 3);
        assert_eq!(meta.column_count(), 3);
        assert_eq!(meta.get_feature_type(2), FeatureType::Ratio);
        assert_eq!(
            TableMetadata::homogen(DataType::UInt8, 1).get_feature_type(0),
            FeatureType::Ordinal
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = TableMetadata::new(vec![DataType::Int32], vec![]).unwrap_err();
        assert!(matches!(err, DalError::InvalidArgument(_)));
    }
}
