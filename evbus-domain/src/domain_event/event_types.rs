//! 事件类型目录
//!
//! 系统内全部事件类型的集中清单，各模块可在此基础上扩展自己的类型字符串。

// Auth & Users
pub const USER_REGISTERED: &str = "USER_REGISTERED";
pub const USER_PROFILE_COMPLETED: &str = "USER_PROFILE_COMPLETED";
pub const USER_LOGIN: &str = "USER_LOGIN";
pub const USER_LOGOUT: &str = "USER_LOGOUT";

// Schools & Classes
pub const SCHOOL_CREATED: &str = "SCHOOL_CREATED";
pub const SCHOOL_VALIDATED: &str = "SCHOOL_VALIDATED";
pub const CLASS_CREATED: &str = "CLASS_CREATED";
pub const CLASS_UPDATED: &str = "CLASS_UPDATED";
pub const TEACHER_ADDED_TO_CLASS: &str = "TEACHER_ADDED_TO_CLASS";
pub const SYLLABUS_CREATED: &str = "SYLLABUS_CREATED";
pub const SYLLABUS_UPDATED: &str = "SYLLABUS_UPDATED";

// Invitations
pub const INVITATION_CREATED: &str = "INVITATION_CREATED";
pub const INVITATION_ACCEPTED: &str = "INVITATION_ACCEPTED";
pub const STUDENT_ENROLLED: &str = "STUDENT_ENROLLED";
pub const BATCH_IMPORT_COMPLETED: &str = "BATCH_IMPORT_COMPLETED";

// Assessments
pub const EXAM_CREATED: &str = "EXAM_CREATED";
pub const EXAM_SUBMITTED_FOR_VALIDATION: &str = "EXAM_SUBMITTED_FOR_VALIDATION";
pub const EXAM_VALIDATED: &str = "EXAM_VALIDATED";
pub const EXAM_PUBLISHED: &str = "EXAM_PUBLISHED";
pub const EXAM_ARCHIVED: &str = "EXAM_ARCHIVED";
pub const EXAM_STATUS_CHANGED: &str = "EXAM_STATUS_CHANGED";
pub const LATE_CODE_GENERATED: &str = "LATE_CODE_GENERATED";
pub const LATE_CODE_USED: &str = "LATE_CODE_USED";

// Exam execution
pub const ATTEMPT_STARTED: &str = "ATTEMPT_STARTED";
pub const QUESTION_ANSWERED: &str = "QUESTION_ANSWERED";
pub const ATTEMPT_SUBMITTED: &str = "ATTEMPT_SUBMITTED";
pub const ATTEMPT_GRADED: &str = "ATTEMPT_GRADED";
pub const ANTI_CHEAT_VIOLATION: &str = "ANTI_CHEAT_VIOLATION";

// Gamification
pub const XP_GAINED: &str = "XP_GAINED";
pub const BADGE_EARNED: &str = "BADGE_EARNED";
pub const LEVEL_UP: &str = "LEVEL_UP";
pub const STREAK_ACHIEVED: &str = "STREAK_ACHIEVED";
pub const CHALLENGE_COMPLETED: &str = "CHALLENGE_COMPLETED";

// Analytics
pub const ANALYTICS_REPORT_GENERATED: &str = "ANALYTICS_REPORT_GENERATED";
pub const PERFORMANCE_ALERT: &str = "PERFORMANCE_ALERT";

// Messaging
pub const FORUM_CREATED: &str = "FORUM_CREATED";
pub const FORUM_POST_CREATED: &str = "FORUM_POST_CREATED";
pub const FORUM_REPLY_CREATED: &str = "FORUM_REPLY_CREATED";
pub const MESSAGE_SENT: &str = "MESSAGE_SENT";
pub const NOTIFICATION_CREATED: &str = "NOTIFICATION_CREATED";
pub const REQUEST_CREATED: &str = "REQUEST_CREATED";
pub const REQUEST_ACCEPTED: &str = "REQUEST_ACCEPTED";
pub const REQUEST_REJECTED: &str = "REQUEST_REJECTED";
pub const REQUEST_COMPLETED: &str = "REQUEST_COMPLETED";
